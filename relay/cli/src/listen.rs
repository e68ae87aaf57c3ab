//! Side-channel observer
//!
//! Accepts side-channel connections and prints every decoded payload to
//! stdout as one JSON line.

use std::io::Write;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use relay_core::transport::{FrameDecoder, Framing, PayloadDecoder, TransportError};

const READ_BUFFER_SIZE: usize = 8192;

/// Decoder matching the sender's framing
enum Decoder {
    Raw(PayloadDecoder),
    Framed(FrameDecoder),
}

impl Decoder {
    fn new(framing: Framing) -> Self {
        match framing {
            Framing::Raw => Self::Raw(PayloadDecoder::new()),
            Framing::LengthPrefixed => Self::Framed(FrameDecoder::new()),
        }
    }

    fn push(&mut self, data: &[u8]) {
        match self {
            Self::Raw(decoder) => decoder.push(data),
            Self::Framed(decoder) => decoder.push(data),
        }
    }

    fn next_payload(&mut self) -> Result<Option<Value>, TransportError> {
        match self {
            Self::Raw(decoder) => decoder.decode(),
            Self::Framed(decoder) => decoder.decode::<Value>(),
        }
    }

    fn pending(&self) -> usize {
        match self {
            Self::Raw(decoder) => decoder.available(),
            Self::Framed(decoder) => decoder.available(),
        }
    }
}

/// Accept connections on `host:port` until interrupted
///
/// With `once`, returns after the first connection closes.
pub async fn run(host: &str, port: u16, framing: Framing, once: bool) -> Result<()> {
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind side-channel listener on {addr}"))?;
    let local = listener.local_addr().context("Listener has no local address")?;

    info!(addr = %local, framing = ?framing, "Listening for side-channel connections");

    loop {
        let (socket, peer) = tokio::select! {
            accepted = listener.accept() => accepted.context("Accept failed")?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping listener");
                return Ok(());
            }
        };

        info!(peer = %peer, "Observer connection accepted");

        if once {
            return observe(socket, framing).await;
        }

        tokio::spawn(async move {
            if let Err(e) = observe(socket, framing).await {
                warn!(peer = %peer, error = %e, "Observer connection failed");
            }
        });
    }
}

/// Print every payload carried by `socket` until the sender closes it
async fn observe(mut socket: TcpStream, framing: Framing) -> Result<()> {
    let mut decoder = Decoder::new(framing);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut payloads: u64 = 0;

    loop {
        let n = socket
            .read(&mut buf)
            .await
            .context("Side-channel read failed")?;
        if n == 0 {
            break;
        }
        decoder.push(&buf[..n]);

        while let Some(payload) = decoder.next_payload().context("Undecodable side-channel payload")? {
            payloads += 1;
            print_payload(&payload)?;
        }
    }

    if decoder.pending() > 0 {
        debug!(bytes = decoder.pending(), "Connection closed mid-payload");
    }
    info!(payloads, "Observer connection closed");
    Ok(())
}

fn print_payload(payload: &Value) -> Result<()> {
    let line = serde_json::to_string(payload).context("Failed to encode payload")?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}").context("Failed to write to stdout")?;
    stdout.flush().context("Failed to flush stdout")
}
