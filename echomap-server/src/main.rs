//! Echomap server CLI.
//!
//! Run with: `cargo run -p echomap-server -- --help`

use clap::Parser;
use echomap_server::{telemetry, EchomapServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::parse();
    telemetry::init_logging(&config.log_level);

    // Optional one-shot dataset pull before serving. Failure is not fatal:
    // the stores retry their load on every query, so data arriving late
    // only delays first results.
    if config.bootstrap_sync {
        match echomap_sync::SyncConfig::from_env() {
            Ok(sync_config) => match echomap_sync::sync(&sync_config).await {
                Ok(report) => tracing::info!(
                    downloaded = report.downloaded,
                    skipped = report.skipped,
                    failed = report.failed,
                    "storage sync complete"
                ),
                Err(e) => tracing::warn!(error = %e, "storage sync failed"),
            },
            Err(e) => tracing::warn!(error = %e, "storage sync not configured"),
        }
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.listen_addr,
        data_dir = %config.data_dir.display(),
        catalog = %config.catalog_path.display(),
        cors = config.cors_enabled,
        "starting echomap server"
    );

    EchomapServer::new(config).run().await.map_err(Into::into)
}
