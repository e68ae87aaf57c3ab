//! Producer task: upstream body -> decoder -> bounded channel

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use super::decoder::{SseDecoder, StreamEvent};
use crate::backend::{BackendError, StreamingToken};

enum Flow {
    Continue,
    Done,
    ReceiverGone,
}

/// Decode `body` and forward its events to `tx` until the stream ends
///
/// Sends one [`StreamingToken::Delta`] per content delta in arrival order,
/// then exactly one terminal token: `Complete` after `[DONE]` or a clean end
/// of body, `Error` if reading the body fails. Malformed payloads are logged
/// and dropped. Returns early if the receiver is dropped.
pub async fn pump<S, B, E>(body: S, tx: mpsc::Sender<StreamingToken>)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    tokio::pin!(body);

    let mut decoder = SseDecoder::new();
    let mut deltas: u32 = 0;

    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                decoder.push(bytes.as_ref());
                match forward(&mut decoder, &tx, &mut deltas).await {
                    Flow::Continue => {}
                    Flow::Done => {
                        tracing::debug!(deltas, "Upstream stream completed");
                        let _ = tx.send(StreamingToken::Complete).await;
                        return;
                    }
                    Flow::ReceiverGone => {
                        tracing::debug!("Stream receiver dropped, abandoning upstream body");
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, deltas, "Upstream body read failed");
                let _ = tx
                    .send(StreamingToken::Error(BackendError::Transport(format!(
                        "error reading response body: {e}"
                    ))))
                    .await;
                return;
            }
        }
    }

    // Body ended without [DONE]
    decoder.finish();
    if let Flow::ReceiverGone = forward(&mut decoder, &tx, &mut deltas).await {
        return;
    }
    tracing::debug!(deltas, "Upstream body ended");
    let _ = tx.send(StreamingToken::Complete).await;
}

async fn forward(
    decoder: &mut SseDecoder,
    tx: &mpsc::Sender<StreamingToken>,
    deltas: &mut u32,
) -> Flow {
    while let Some(event) = decoder.next_event() {
        match event {
            StreamEvent::ContentDelta(text) => {
                *deltas += 1;
                if tx.send(StreamingToken::Delta(text)).await.is_err() {
                    return Flow::ReceiverGone;
                }
            }
            StreamEvent::Malformed(raw) => {
                tracing::debug!(bytes = raw.len(), "Dropping malformed stream payload");
            }
            StreamEvent::Done => return Flow::Done,
        }
    }
    Flow::Continue
}
