//! HTTP route handlers and router configuration.
//!
//! Each analyzer kind gets one POST endpoint; request bodies mirror the
//! published client contract (`center_lat`/`center_lon`/`res`/`k` plus the
//! kind's extensions) and map onto core [`QueryParams`]. Handlers stay
//! thin: deserialize, convert, run, serialize.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use echomap_spatial::{QueryParams, ResultEnvelope, SelectionMode};

use crate::error::{Result, ServerError};
use crate::state::AppState;

/// Build the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .route("/config/master_catalog", get(master_catalog))
        .route("/analyze/pois_h3", post(analyze_pois))
        .route("/analyze/trains_h3", post(analyze_trains))
        .route("/analyze/zones_h3", post(analyze_zones))
        .route("/analyze/meshprops_h3", post(analyze_meshprops))
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http());

    if state.config.cors_enabled {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}

fn default_res() -> u8 {
    8
}

fn default_k() -> u32 {
    4
}

fn default_band_index() -> u32 {
    2
}

fn default_clip_mode() -> SelectionMode {
    SelectionMode::Disk
}

/// Points-of-interest request.
#[derive(Debug, Deserialize)]
pub struct PoisRequest {
    pub center_lat: f64,
    pub center_lon: f64,
    #[serde(default = "default_res")]
    pub res: u8,
    #[serde(default = "default_k")]
    pub k: u32,
    #[serde(default)]
    pub include_ftypes: Option<Vec<String>>,
    #[serde(default)]
    pub disk_k: Option<u32>,
}

impl PoisRequest {
    fn into_params(self) -> QueryParams {
        let mut params = QueryParams::new(self.center_lon, self.center_lat, self.res, self.k);
        if let Some(depth) = self.disk_k {
            params = params.with_disk_depth(depth);
        }
        if let Some(ftypes) = self.include_ftypes {
            params = params.with_attribute_filter(ftypes);
        }
        params
    }
}

/// Train-stations request.
#[derive(Debug, Deserialize)]
pub struct TrainsRequest {
    pub center_lat: f64,
    pub center_lon: f64,
    #[serde(default = "default_res")]
    pub res: u8,
    #[serde(default = "default_k")]
    pub k: u32,
    #[serde(default = "default_band_index")]
    pub band_index: u32,
}

impl TrainsRequest {
    fn into_params(self) -> QueryParams {
        QueryParams::new(self.center_lon, self.center_lat, self.res, self.k)
            .with_band_index(self.band_index)
    }
}

/// Planning-zones request.
#[derive(Debug, Deserialize)]
pub struct ZonesRequest {
    pub center_lat: f64,
    pub center_lon: f64,
    #[serde(default = "default_res")]
    pub res: u8,
    #[serde(default = "default_k")]
    pub k: u32,
    #[serde(default = "default_band_index")]
    pub band_index: u32,
    #[serde(default)]
    pub codes: Option<Vec<String>>,
    #[serde(default = "default_clip_mode")]
    pub clip_mode: SelectionMode,
    #[serde(default)]
    pub simplify_tolerance_m: Option<f64>,
}

impl ZonesRequest {
    fn into_params(self) -> QueryParams {
        let mut params = QueryParams::new(self.center_lon, self.center_lat, self.res, self.k)
            .with_mode(self.clip_mode)
            .with_band_index(self.band_index);
        if let Some(codes) = self.codes {
            params = params.with_attribute_filter(codes);
        }
        if let Some(tolerance) = self.simplify_tolerance_m {
            params = params.with_simplify_tolerance(tolerance);
        }
        params
    }
}

/// Mesh-blocks/parcels request.
#[derive(Debug, Deserialize)]
pub struct MeshPropsRequest {
    pub center_lat: f64,
    pub center_lon: f64,
    #[serde(default = "default_res")]
    pub res: u8,
    #[serde(default = "default_k")]
    pub k: u32,
    #[serde(default)]
    pub which: Option<MeshWhich>,
    #[serde(default)]
    pub disk_k: Option<u32>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshWhich {
    Mesh,
    Parcels,
}

impl MeshWhich {
    fn layer(self) -> &'static str {
        match self {
            MeshWhich::Mesh => "mesh",
            MeshWhich::Parcels => "parcels",
        }
    }
}

impl MeshPropsRequest {
    fn into_params(self) -> QueryParams {
        let mut params = QueryParams::new(self.center_lon, self.center_lat, self.res, self.k);
        if let Some(depth) = self.disk_k {
            params = params.with_disk_depth(depth);
        }
        if let Some(which) = self.which {
            params = params.with_attribute_filter(vec![which.layer().to_string()]);
        }
        params
    }
}

async fn analyze_pois(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PoisRequest>,
) -> Result<Json<ResultEnvelope>> {
    Ok(Json(state.pois.run(request.into_params())?))
}

async fn analyze_trains(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TrainsRequest>,
) -> Result<Json<ResultEnvelope>> {
    Ok(Json(state.trains.run(request.into_params())?))
}

async fn analyze_zones(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ZonesRequest>,
) -> Result<Json<ResultEnvelope>> {
    Ok(Json(state.zones.run(request.into_params())?))
}

async fn analyze_meshprops(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MeshPropsRequest>,
) -> Result<Json<ResultEnvelope>> {
    Ok(Json(state.meshprops.run(request.into_params())?))
}

async fn healthz(State(state): State<Arc<AppState>>) -> Json<Value> {
    let dataset = state.config.data_dir.join("master");
    Json(json!({
        "ok": dataset.is_dir(),
        "data_dir": state.config.data_dir.display().to_string(),
        "catalog": state.config.catalog_path.display().to_string(),
    }))
}

async fn master_catalog(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let path = &state.config.catalog_path;
    if !path.exists() {
        return Err(ServerError::CatalogNotFound(path.display().to_string()));
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ServerError::CatalogUnreadable(format!("{}: {e}", path.display())))?;
    let catalog: Value = serde_json::from_str(&raw)
        .map_err(|e| ServerError::CatalogUnreadable(format!("{}: {e}", path.display())))?;
    Ok(Json(catalog))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pois_request_maps_filter_and_depth() {
        let request: PoisRequest = serde_json::from_value(json!({
            "center_lat": -37.8, "center_lon": 144.9,
            "include_ftypes": ["CAFE"], "disk_k": 2
        }))
        .unwrap();
        let params = request.into_params();
        assert_eq!(params.resolution, 8);
        assert_eq!(params.k, 4);
        assert_eq!(params.mode, SelectionMode::Disk);
        assert_eq!(params.disk_depth, Some(2));
        assert_eq!(params.attribute_filter, Some(vec!["CAFE".to_string()]));
    }

    #[test]
    fn trains_request_defaults_band_index() {
        let request: TrainsRequest = serde_json::from_value(json!({
            "center_lat": -37.8, "center_lon": 144.9
        }))
        .unwrap();
        let params = request.into_params();
        assert_eq!(params.band_index, Some(2));
        assert_eq!(params.mode, SelectionMode::Disk);
        assert_eq!(params.disk_depth, None);
    }

    #[test]
    fn zones_request_carries_mode_codes_and_tolerance() {
        let request: ZonesRequest = serde_json::from_value(json!({
            "center_lat": -37.8, "center_lon": 144.9,
            "clip_mode": "band", "band_index": 1,
            "codes": ["GRZ1"], "simplify_tolerance_m": 25.0
        }))
        .unwrap();
        let params = request.into_params();
        assert_eq!(params.mode, SelectionMode::Band);
        assert_eq!(params.band_index, Some(1));
        assert_eq!(params.attribute_filter, Some(vec!["GRZ1".to_string()]));
        assert_eq!(params.simplify_tolerance, Some(25.0));
    }

    #[test]
    fn unknown_clip_mode_is_rejected_at_the_boundary() {
        let result: std::result::Result<ZonesRequest, _> = serde_json::from_value(json!({
            "center_lat": -37.8, "center_lon": 144.9, "clip_mode": "ring"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn mesh_which_becomes_a_layer_filter() {
        let request: MeshPropsRequest = serde_json::from_value(json!({
            "center_lat": -37.8, "center_lon": 144.9, "which": "parcels"
        }))
        .unwrap();
        let params = request.into_params();
        assert_eq!(
            params.attribute_filter,
            Some(vec!["parcels".to_string()])
        );
    }
}
