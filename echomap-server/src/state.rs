//! Application state: the long-lived analyzer services.
//!
//! One service per analyzer kind, constructed once at startup and shared
//! with every request handler through `Arc<AppState>`. The stores inside
//! stay unloaded until their first query; a failed load is retried on the
//! next request, so a dataset that syncs in late never requires a restart.

use std::sync::Arc;

use echomap_spatial::{kinds, AnalyzerService, MetricProjection};

use crate::config::ServerConfig;

/// Shared application state.
pub struct AppState {
    pub config: ServerConfig,
    pub pois: AnalyzerService,
    pub trains: AnalyzerService,
    pub zones: AnalyzerService,
    pub meshprops: AnalyzerService,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let projection = Arc::new(MetricProjection::new());
        let data_dir = config.data_dir.clone();
        Self {
            pois: AnalyzerService::new(kinds::pois(), &data_dir, projection.clone()),
            trains: AnalyzerService::new(kinds::stations(), &data_dir, projection.clone()),
            zones: AnalyzerService::new(kinds::zones(), &data_dir, projection.clone()),
            meshprops: AnalyzerService::new(kinds::meshprops(), &data_dir, projection),
            config,
        }
    }
}
