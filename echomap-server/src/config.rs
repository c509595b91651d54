//! Server configuration.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Echomap analysis server configuration.
///
/// Every flag has an environment fallback so container deployments can run
/// the binary without arguments.
#[derive(Debug, Clone, Parser)]
#[command(name = "echomap-server", version, about = "Hex-window spatial analysis API")]
pub struct ServerConfig {
    /// Address to listen on.
    #[arg(long, env = "ECHOMAP_LISTEN_ADDR", default_value = "0.0.0.0:8000")]
    pub listen_addr: SocketAddr,

    /// Root directory holding the synced base-layer datasets.
    #[arg(long, env = "LOCAL_DATA_BASE", default_value = "data_master")]
    pub data_dir: PathBuf,

    /// Master catalog document served to clients.
    #[arg(long, env = "MASTER_CATALOG_PATH", default_value = "config/master_catalog.json")]
    pub catalog_path: PathBuf,

    /// Enable permissive CORS (disable when fronted by a gateway that owns
    /// CORS).
    #[arg(long, env = "ECHOMAP_CORS", default_value_t = true)]
    pub cors_enabled: bool,

    /// Fallback log level when RUST_LOG is not set.
    #[arg(long, env = "ECHOMAP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Pull the base-layer dataset from remote object storage before
    /// serving.
    #[arg(long, env = "BOOTSTRAP_FROM_STORAGE", default_value_t = false)]
    pub bootstrap_sync: bool,
}
