//! tablemap - connectivity check.
//!
//! Opens the configured store the way an application would (pooled or one
//! connection per operation), pings it and reports the pool state.

use clap::Parser;
use std::time::Duration;
use tablemap::config::Config;
use tablemap::db::Lease;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

async fn check(lease: &mut Lease, limit: Duration) -> tablemap::DbResult<String> {
    lease.ping(limit).await?;
    lease.server_version(limit).await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    info!("Starting tablemap v{}", env!("CARGO_PKG_VERSION"));

    let source = config.connection_source().await?;
    let limit = config.orm_options().statement_timeout;

    let mut lease = source.lease().await?;
    let result = check(&mut lease, limit).await;
    lease.finish().await;

    match &result {
        Ok(version) => info!(db_type = %source.db_type(), version = %version, "Store reachable"),
        Err(e) => error!(error = %e, suggestion = ?e.suggestion(), "Store check failed"),
    }

    if let Some(status) = source.pool_status() {
        info!(
            capacity = status.capacity,
            available = status.available,
            leased = status.leased,
            "Pool status"
        );
    }

    source.shutdown().await;
    result?;
    info!("Shutdown complete");
    Ok(())
}
