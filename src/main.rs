use clap::Parser;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use parley::config::RelayConfig;
use parley::signaling::SignalingServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = RelayConfig::parse();

    println!("   Parley Signaling Relay");
    println!("   Binding to {}", config.bind_address());
    println!("   Press Ctrl+C to stop\n");

    let server = SignalingServer::new(config);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            let stats = server.stats().await?;
            info!(
                "Shutting down ({} connections, {} rooms)",
                stats.connections, stats.rooms
            );
        }
    }

    Ok(())
}
