//! Analyzer kind declarations and the per-kind service objects.
//!
//! Every analyzer (points of interest, stations, zoning, mesh/parcels) is
//! the same hex-window engine run against a differently configured base
//! layer. The differences live here as declared data: which layers feed
//! the store, which attribute columns are forwarded to clients, which
//! column an allow-list filter applies to, the default disk-depth policy,
//! and an optional result cap. Forwarded attributes are an explicit schema
//! per kind, never inferred from whatever columns a layer happens to carry.

use std::path::PathBuf;
use std::sync::Arc;

use crate::engine::{self, QueryParams};
use crate::envelope::ResultEnvelope;
use crate::error::Result;
use crate::store::{BaseLayer, LayerStore, SOURCE_LAYER_ATTRIBUTE};
use crate::transform::MetricProjection;

/// Which record attributes are forwarded into result features.
#[derive(Debug, Clone, Copy)]
pub enum AttributeSchema {
    /// Forward every retained column (richer layers: stations, zones,
    /// mesh). Declared, deliberate: these layers carry an open set of
    /// user-relevant columns.
    All,
    /// Forward exactly the named columns.
    Only(&'static [&'static str]),
}

/// Default disk depth when a request does not override it.
#[derive(Debug, Clone, Copy)]
pub enum DepthPolicy {
    /// A fixed ring depth.
    Fixed(u32),
    /// Reuse the request's band index as the depth.
    BandIndex,
    /// The full built neighborhood depth `k`.
    FullK,
}

/// Declared configuration of one analyzer kind.
#[derive(Debug, Clone)]
pub struct KindConfig {
    /// Kind name, also used in logs and summaries.
    pub name: &'static str,
    /// Dataset directory the layers live under.
    pub dataset: &'static str,
    /// Source layers, concatenated in order after per-layer normalization.
    pub layers: &'static [&'static str],
    /// Forwarded attribute schema.
    pub attributes: AttributeSchema,
    /// Column the request allow-list filter applies to, if the kind has
    /// one.
    pub filter_column: Option<&'static str>,
    /// Default disk depth policy.
    pub depth_policy: DepthPolicy,
    /// Volume limiter applied when the request does not set its own.
    pub result_cap: Option<usize>,
}

/// Points of interest: point features, two forwarded columns, type-code
/// filter, shallow default disk.
pub fn pois() -> KindConfig {
    KindConfig {
        name: "pois",
        dataset: "master",
        layers: &["pois"],
        attributes: AttributeSchema::Only(&["FTYPE", "UFI"]),
        filter_column: Some("FTYPE"),
        depth_policy: DepthPolicy::Fixed(3),
        result_cap: Some(4000),
    }
}

/// Train stations: metro and regional sub-layers concatenated, all columns
/// forwarded.
pub fn stations() -> KindConfig {
    KindConfig {
        name: "stations",
        dataset: "master",
        layers: &["metro_stations", "regional_stations"],
        attributes: AttributeSchema::All,
        filter_column: None,
        depth_policy: DepthPolicy::BandIndex,
        result_cap: None,
    }
}

/// Planning zones: polygon features, zone-code filter, optional boundary
/// simplification.
pub fn zones() -> KindConfig {
    KindConfig {
        name: "zones",
        dataset: "master",
        layers: &["planning_zones"],
        attributes: AttributeSchema::All,
        filter_column: Some("ZONE_CODE"),
        depth_policy: DepthPolicy::BandIndex,
        result_cap: None,
    }
}

/// Mesh blocks and parcels: two polygon sub-layers; the source-layer tag
/// doubles as the selector between them.
pub fn meshprops() -> KindConfig {
    KindConfig {
        name: "meshprops",
        dataset: "master",
        layers: &["mesh", "parcels"],
        attributes: AttributeSchema::All,
        filter_column: Some(SOURCE_LAYER_ATTRIBUTE),
        depth_policy: DepthPolicy::FullK,
        result_cap: None,
    }
}

/// Long-lived analyzer: a kind, its store, and the shared projection.
///
/// Constructed once at process start and handed to request handlers by
/// reference; the store inside performs the one lazy load per process.
pub struct AnalyzerService {
    kind: KindConfig,
    store: LayerStore,
    projection: Arc<MetricProjection>,
}

impl AnalyzerService {
    pub fn new(
        kind: KindConfig,
        data_dir: impl Into<PathBuf>,
        projection: Arc<MetricProjection>,
    ) -> Self {
        let store = LayerStore::for_kind(&kind, data_dir, projection.clone());
        Self {
            kind,
            store,
            projection,
        }
    }

    pub fn kind(&self) -> &KindConfig {
        &self.kind
    }

    /// Access the underlying store (e.g. to warm it at startup).
    pub fn store(&self) -> &dyn BaseLayer {
        &self.store
    }

    /// Run one hex-window query against this analyzer's base layer.
    pub fn run(&self, params: QueryParams) -> Result<ResultEnvelope> {
        engine::run(&self.kind, &self.store, &self.projection, params)
    }
}
