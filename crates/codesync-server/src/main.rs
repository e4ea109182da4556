//! # codesync relay
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! codesync
//!
//! # Run with environment overrides
//! CODESYNC_PORT=8080 CODESYNC_HOST=0.0.0.0 CODESYNC_RELAY__SEND_TIMEOUT_MS=2000 codesync
//! ```

use anyhow::Result;
use codesync_server::{config::Config, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "codesync_server=debug,codesync_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;

    tracing::info!("Starting codesync relay on {}:{}", config.host, config.port);

    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}
