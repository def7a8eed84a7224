//! HTTP ingress server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ net::Listener ──▶ http::server (hyper, HTTP/1.1)
//!                                            │ head / chunk / end
//!                                            ▼
//!                                  ingress::ConnectionDriver
//!                          (assembler → admission → size guard)
//!                                 │                    │
//!                        accepted │                    │ rejected
//!                                 ▼                    ▼
//!                       handoff lanes ──▶ workers   413 + reason text
//!                                           │
//!     Client Response                       │ InboundMessage::respond
//!     ◀─────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use http_ingress::config::{load_config, IngressConfig};
use http_ingress::lifecycle::{self, wait_for_signal};
use http_ingress::observability::{logging, metrics};
use http_ingress::SummaryProcessor;

#[derive(Parser)]
#[command(name = "http-ingress")]
#[command(about = "HTTP ingress with size guard and event handoff", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => IngressConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "http-ingress starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        size_guard = config.size_guard.enabled,
        max_body_bytes = config.size_guard.max_body_bytes,
        shared_channel = config.channel.shared,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let ingress = lifecycle::start(&config, Arc::new(SummaryProcessor)).await?;

    let shutdown = ingress.shutdown_handle();
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.trigger();
    });

    ingress.wait().await?;
    Ok(())
}
