//! MyRentalHost Concierge - Main entry point.

use anyhow::Result;
use concierge_common::config::Config;
use concierge_common::logging::init_from_config;
use concierge_gateway::start_server;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load_with_env()?;

    // Initialize logging
    init_from_config(&config.observability);

    config.validate()?;

    tracing::info!("MyRentalHost Concierge v{}", env!("CARGO_PKG_VERSION"));

    // Start the HTTP server
    start_server(&config).await
}
