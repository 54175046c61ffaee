//! src/bin/stub_backend.rs
//! Run: cargo run --bin stub-backend -- <port> [seed-key]

use anyhow::Result;
use hash_balancer::stub::{StubBackend, StubConfig};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hash_balancer=info".parse()?),
        )
        .init();

    // ── Parse args / env ─────────────────────────────────────────────
    let port: u16 = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "8080".into())
        .parse()?;

    let mut config = StubConfig::from_env();
    if let Some(seed_key) = std::env::args().nth(2) {
        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        config = config.with_entry(seed_key, today);
    }

    info!(
        port,
        health_failure = config.health_failure,
        delay = ?config.response_delay,
        entries = config.data.len(),
        "Starting stub backend"
    );

    let shutdown = CancellationToken::new();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let (local_addr, server) = StubBackend::new(config).spawn(addr, shutdown.clone())?;
    info!("Stub backend listening on http://{}", local_addr);

    tokio::signal::ctrl_c().await?;
    shutdown.cancel();
    server.await?;
    Ok(())
}
