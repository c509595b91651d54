//! Echomap HTTP server.
//!
//! A thin axum wrapper around the `echomap-spatial` analyzers: one POST
//! endpoint per analyzer kind, a health probe, and the master catalog
//! document. Analyzer services are built once at startup and shared across
//! requests; their base layers load lazily on first use.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use state::AppState;

use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Echomap HTTP server.
pub struct EchomapServer {
    state: Arc<AppState>,
    router: Router,
}

impl EchomapServer {
    /// Create a server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        let state = Arc::new(AppState::new(config));
        let router = routes::build_router(state.clone());
        Self { state, router }
    }

    /// Application state (for tests and embedders).
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Router (for in-process testing without a socket).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Bind and serve until the process is terminated.
    pub async fn run(self) -> std::io::Result<()> {
        let addr = self.state.config.listen_addr;
        let listener = TcpListener::bind(addr).await?;
        info!(
            addr = %addr,
            data_dir = %self.state.config.data_dir.display(),
            cors = self.state.config.cors_enabled,
            "echomap server listening"
        );
        axum::serve(listener, self.router).await
    }
}
