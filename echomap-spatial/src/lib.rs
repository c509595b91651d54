//! Hex-window spatial query core.
//!
//! Answers "what is near this map location?" against fixed geospatial base
//! layers by building a hexagonal-grid neighborhood around a center point
//! and selecting the features inside it.
//!
//! ```text
//! (center, res, k)                base layer (GeoJSON, per kind)
//!        │                                  │  lazy single-flight load,
//!        ▼                                  ▼  CRS-normalized to metric
//!  center cell ─► ring partition ─► ring polygons (metric CRS)
//!        │                                  │
//!        ▼                                  ▼
//!  disk / band mask ──────────► R-tree bbox prefilter
//!                                           │
//!                                           ▼
//!                              exact intersection refine (geo crate)
//!                                           │
//!                                           ▼
//!                    filter · cap · simplify · reproject to WGS84
//!                                           │
//!                                           ▼
//!                      features + mask + summary envelope
//! ```
//!
//! # Modules
//!
//! - [`grid`]: H3 cell resolution, ring partitions, hexagon polygons
//! - [`transform`]: WGS84 <-> GDA2020/MGA55 (EPSG:7855) projection
//! - [`store`]: lazily loaded, spatially indexed base-layer stores
//! - [`engine`]: the generic hex-window query pipeline
//! - [`envelope`]: feature-collection + mask + summary serialization
//! - [`kinds`]: declared analyzer configurations and service objects
//! - [`error`]: error taxonomy

pub mod engine;
pub mod envelope;
pub mod error;
pub mod grid;
pub mod kinds;
pub mod store;
pub mod transform;

pub use engine::{QueryParams, SelectionMode};
pub use envelope::{GridEcho, ResultEnvelope, Summary};
pub use error::{AnalysisError, Result};
pub use kinds::{AnalyzerService, AttributeSchema, DepthPolicy, KindConfig};
pub use store::{BaseLayer, FeatureRecord, LayerSnapshot, LayerStore, SOURCE_LAYER_ATTRIBUTE};
pub use transform::MetricProjection;
