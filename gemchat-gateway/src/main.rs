//! Gemchat Gateway - Main entry point.

use anyhow::Result;
use gemchat_common::config::Config;
use gemchat_common::logging::init_logging;
use gemchat_common::Validate;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration, then let the environment override it
    let config = Config::load_with_env()?;

    init_logging(
        config.observability.effective_log_level(),
        &config.observability.log_format,
    );

    tracing::info!("Gemchat Gateway v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }

    gemchat_gateway::start_server(&config).await
}
