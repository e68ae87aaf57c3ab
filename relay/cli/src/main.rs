//! chat-relay command-line entry point
//!
//! # Usage
//!
//! ```bash
//! # Run one turn, reading the input bag from stdin
//! echo '{"input": "@"}' | relay turn
//!
//! # Input bag from a file, custom config
//! relay turn --bag bag.json --config ./relay.toml
//!
//! # Print side-channel payloads as they arrive
//! relay listen --host 127.0.0.1 --port 9000
//!
//! # Verbose logging
//! RUST_LOG=debug relay turn --bag bag.json
//! ```
//!
//! Logs go to stderr; stdout carries only the output bag (for `turn`) or one
//! JSON line per payload (for `listen`).

mod listen;

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;

use relay_core::config::{self, ConfigOverrides};
use relay_core::transport::Framing;

/// chat-relay - one conversational turn with streamed side-channel output
#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "RELAY_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process one turn and print the output bag
    Turn {
        /// Input bag JSON file ("-" or omitted reads stdin)
        #[arg(short = 'b', long, value_name = "FILE")]
        bag: Option<PathBuf>,

        /// Configuration file path
        #[arg(short = 'c', long, env = "RELAY_CONFIG", value_name = "FILE")]
        config: Option<PathBuf>,

        /// Default model override (must be in the catalog)
        #[arg(short = 'm', long, value_name = "MODEL")]
        model: Option<String>,

        /// Use a single blocking request instead of streaming
        #[arg(long)]
        no_stream: bool,

        /// Characters per side-channel slice for command and error texts
        #[arg(long, value_name = "N")]
        chunk_size: Option<usize>,

        /// Side-channel wire format (raw, length-prefixed)
        #[arg(long, value_name = "FORMAT")]
        framing: Option<Framing>,
    },

    /// Accept side-channel connections and print each payload
    Listen {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind (0 picks a free port)
        #[arg(short = 'p', long)]
        port: u16,

        /// Side-channel wire format (raw, length-prefixed)
        #[arg(long, default_value = "raw", value_name = "FORMAT")]
        framing: Framing,

        /// Exit after the first connection closes
        #[arg(long)]
        once: bool,
    },
}

/// Initialize logging on stderr with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("relay_cli={level},relay_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

/// Read the input bag from `path`, or stdin for `-` / none
fn read_bag(path: Option<&PathBuf>) -> Result<Value> {
    let raw = match path {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input bag: {}", path.display()))?,
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read input bag from stdin")?;
            buf
        }
    };

    serde_json::from_str(&raw).context("Input bag is not valid JSON")
}

async fn run_turn(
    bag: Option<PathBuf>,
    config_path: Option<PathBuf>,
    overrides: ConfigOverrides,
) -> Result<()> {
    let bag = read_bag(bag.as_ref())?;

    let path = config_path.or_else(config::default_config_path);
    let mut relay_config = config::load_config_from_path(path.as_deref())
        .context("Failed to load configuration")?;
    overrides
        .apply(&mut relay_config)
        .context("Invalid command-line override")?;

    info!(
        source = %relay_config.source(),
        streaming = relay_config.streaming,
        default_model = %relay_config.catalog.default_model(),
        "Configuration loaded"
    );

    let outcome = relay_core::run_turn(&bag, &relay_config, |key| std::env::var(key).ok()).await;

    let out = serde_json::to_string(&outcome).context("Failed to encode output bag")?;
    println!("{out}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    match args.command {
        Commands::Turn {
            bag,
            config,
            model,
            no_stream,
            chunk_size,
            framing,
        } => {
            let mut overrides = ConfigOverrides::new();
            if let Some(model) = model {
                overrides = overrides.with_default_model(model);
            }
            if no_stream {
                overrides = overrides.with_streaming(false);
            }
            if let Some(size) = chunk_size {
                overrides = overrides.with_chunk_size(size);
            }
            if let Some(framing) = framing {
                overrides = overrides.with_framing(framing);
            }
            run_turn(bag, config, overrides).await
        }
        Commands::Listen {
            host,
            port,
            framing,
            once,
        } => listen::run(&host, port, framing, once).await,
    }
}
