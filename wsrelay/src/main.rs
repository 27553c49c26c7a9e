mod http;
mod server;

use anyhow::Result;
use tracing::info;

use wsrelay_core::{
    bootstrap::{init_services, load_config},
    logging,
};

use server::RelayServer;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load and validate configuration
    let config = load_config()?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("wsrelay starting...");
    info!("Configuration loaded and validated");
    info!(
        region = %config.delivery.region,
        endpoint = %config.delivery.endpoint,
        table = %config.registry.table_name,
        "Relay configuration"
    );
    info!("HTTP address: {}", config.http_address());

    // 3. Initialize registry and dispatcher
    let services = init_services(&config).await?;

    // 4. Serve until shutdown
    RelayServer::new(config, services.into()).start().await
}
