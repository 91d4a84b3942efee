use std::io;

use prx_bridge_mcp::{BridgeConfig, BridgeServer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .compact()
        .try_init();

    let config = BridgeConfig::from_env();
    if config.backend_url.is_none() {
        warn!("PRX_BRIDGE_BACKEND_URL unset; every request must carry x-backend-url");
    }

    let server = BridgeServer::from_config(config)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
        }
        shutdown.cancel();
    });

    server.serve().await
}
