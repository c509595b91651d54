//! The hex-window query engine.
//!
//! One generic pipeline serves every analyzer kind: resolve the center
//! cell, partition its neighborhood into distance rings, materialize ring
//! geometry in the metric CRS, select a disk or band mask, prefilter the
//! base layer through its spatial index, refine by exact intersection,
//! apply the declared attribute filter and volume cap, then reproject and
//! serialize. Per-kind behavior enters only through [`KindConfig`].
//!
//! Disk mode answers "everything within N rings" (cumulative, monotonic in
//! N); band mode answers "everything in exactly the Nth ring". Both share
//! the ring construction; only the mask selection differs.

use geo::{BooleanOps, BoundingRect, Intersects, MapCoords, Simplify};
use geo_types::{coord, Geometry, MultiPolygon};
use h3o::CellIndex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::envelope::{self, GridEcho, ResultEnvelope, Summary};
use crate::error::{AnalysisError, Result};
use crate::grid;
use crate::kinds::{DepthPolicy, KindConfig};
use crate::store::{BaseLayer, FeatureRecord};
use crate::transform::MetricProjection;

/// Band index assumed when a banded request does not name one.
const DEFAULT_BAND_INDEX: u32 = 2;

/// Mask selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Union of rings `0..=depth`: a cumulative neighborhood.
    Disk,
    /// A single ring: an exact annular band, not cumulative.
    Band,
}

impl SelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMode::Disk => "disk",
            SelectionMode::Band => "band",
        }
    }
}

/// Parameters of one hex-window query.
///
/// Band index and disk depth are clamped into `[0, k]`; an absent disk
/// depth falls back to the analyzer kind's declared policy. Everything
/// else is validated, not clamped.
#[derive(Debug, Clone)]
pub struct QueryParams {
    pub center_lon: f64,
    pub center_lat: f64,
    pub resolution: u8,
    pub k: u32,
    pub mode: SelectionMode,
    pub band_index: Option<u32>,
    pub disk_depth: Option<u32>,
    pub attribute_filter: Option<Vec<String>>,
    pub result_cap: Option<usize>,
    pub simplify_tolerance: Option<f64>,
}

impl QueryParams {
    pub fn new(center_lon: f64, center_lat: f64, resolution: u8, k: u32) -> Self {
        Self {
            center_lon,
            center_lat,
            resolution,
            k,
            mode: SelectionMode::Disk,
            band_index: None,
            disk_depth: None,
            attribute_filter: None,
            result_cap: None,
            simplify_tolerance: None,
        }
    }

    pub fn with_mode(mut self, mode: SelectionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_band_index(mut self, band_index: u32) -> Self {
        self.band_index = Some(band_index);
        self
    }

    pub fn with_disk_depth(mut self, depth: u32) -> Self {
        self.disk_depth = Some(depth);
        self
    }

    pub fn with_attribute_filter(mut self, allow: Vec<String>) -> Self {
        self.attribute_filter = Some(allow);
        self
    }

    pub fn with_result_cap(mut self, cap: usize) -> Self {
        self.result_cap = Some(cap);
        self
    }

    pub fn with_simplify_tolerance(mut self, tolerance_m: f64) -> Self {
        self.simplify_tolerance = Some(tolerance_m);
        self
    }
}

/// Run one query against a base layer.
pub fn run(
    kind: &KindConfig,
    store: &dyn BaseLayer,
    projection: &MetricProjection,
    params: QueryParams,
) -> Result<ResultEnvelope> {
    if params.attribute_filter.is_some() && kind.filter_column.is_none() {
        return Err(AnalysisError::invalid_parameter(format!(
            "analyzer {} does not support an attribute filter",
            kind.name
        )));
    }

    let band_index = params.band_index.unwrap_or(DEFAULT_BAND_INDEX).min(params.k);
    let disk_depth = params
        .disk_depth
        .unwrap_or(match kind.depth_policy {
            DepthPolicy::Fixed(depth) => depth,
            DepthPolicy::BandIndex => band_index,
            DepthPolicy::FullK => params.k,
        })
        .min(params.k);

    // Steps 1-2: center cell and exact ring partition.
    let center = grid::cell_for(params.center_lat, params.center_lon, params.resolution)?;
    let rings = grid::ring_partition(center, params.k);

    // Step 3: per-ring geometry. The boolean union dissolves shared hexagon
    // edges, so each ring is a clean annulus with no interior slivers.
    let ring_polygons: Vec<MultiPolygon<f64>> = rings
        .iter()
        .map(|cells| union_hexagons(cells, projection))
        .collect();

    // Step 4: mask selection.
    let mask = match params.mode {
        SelectionMode::Disk => union_all(&ring_polygons[..=disk_depth as usize]),
        SelectionMode::Band => ring_polygons[band_index as usize].clone(),
    };

    // Step 5: index prefilter over the mask extent.
    let bbox = mask
        .bounding_rect()
        .ok_or_else(|| AnalysisError::processing("mask", "mask geometry has no extent"))?;
    store.ensure_loaded()?;
    let candidate_indices = store.candidates(&bbox)?;
    let candidates = store.records_at(&candidate_indices)?;
    let candidate_count = candidates.len();

    // Step 6: exact intersection is the correctness guarantee; the index
    // was only a fast reject.
    let mut selected: Vec<FeatureRecord> = candidates
        .into_iter()
        .filter(|record| record.geometry.intersects(&mask))
        .collect();

    // Step 7: declared-column allow-list.
    if let (Some(column), Some(allow)) = (kind.filter_column, params.attribute_filter.as_ref()) {
        selected.retain(|record| attribute_matches(record, column, allow));
    }

    // Step 8: volume cap, a prefix in store index order. Arbitrary with
    // respect to relevance.
    let cap = params.result_cap.or(kind.result_cap);
    let truncated = cap.is_some_and(|cap| selected.len() > cap);
    if let Some(cap) = cap {
        selected.truncate(cap);
    }

    // Step 9: optional metric-CRS simplification, then back to geographic.
    let features: Vec<FeatureRecord> = selected
        .into_iter()
        .map(|mut record| {
            if let Some(tolerance) = params.simplify_tolerance {
                if tolerance > 0.0 {
                    record.geometry = simplify_polygonal(record.geometry, tolerance);
                }
            }
            record.geometry = reproject_geographic(record.geometry, projection);
            record
        })
        .collect();
    let mask_geographic = mask.map_coords(|c| {
        let (lon, lat) = projection.to_geographic(c.x, c.y);
        coord! { x: lon, y: lat }
    });

    debug!(
        kind = kind.name,
        mode = params.mode.as_str(),
        res = params.resolution,
        k = params.k,
        candidates = candidate_count,
        selected = features.len(),
        truncated,
        "hex-window query complete"
    );

    // Step 10: envelope.
    let summary = Summary {
        count: features.len(),
        h3: GridEcho {
            res: params.resolution,
            k: params.k,
            depth: matches!(params.mode, SelectionMode::Disk).then_some(disk_depth),
        },
        select_mode: params.mode.as_str(),
        ring_selected: matches!(params.mode, SelectionMode::Band).then_some(band_index),
        filtered_types: params.attribute_filter.clone(),
        truncated,
    };
    Ok(envelope::build(
        &kind.attributes,
        &features,
        &mask_geographic,
        summary,
    ))
}

/// Union the hexagon polygons of a cell set into one ring geometry.
fn union_hexagons(cells: &[CellIndex], projection: &MetricProjection) -> MultiPolygon<f64> {
    cells.iter().fold(MultiPolygon::new(Vec::new()), |acc, cell| {
        let hexagon = MultiPolygon::new(vec![grid::hex_polygon_metric(*cell, projection)]);
        if acc.0.is_empty() {
            hexagon
        } else {
            acc.union(&hexagon)
        }
    })
}

/// Union a run of ring geometries into a disk mask.
fn union_all(rings: &[MultiPolygon<f64>]) -> MultiPolygon<f64> {
    rings.iter().fold(MultiPolygon::new(Vec::new()), |acc, ring| {
        if acc.0.is_empty() {
            ring.clone()
        } else if ring.0.is_empty() {
            acc
        } else {
            acc.union(ring)
        }
    })
}

fn attribute_matches(record: &FeatureRecord, column: &str, allow: &[String]) -> bool {
    match record.attributes.get(column) {
        Some(serde_json::Value::String(value)) => allow.iter().any(|a| a == value),
        Some(serde_json::Value::Number(value)) => {
            let value = value.to_string();
            allow.iter().any(|a| *a == value)
        }
        _ => false,
    }
}

fn simplify_polygonal(geometry: Geometry<f64>, tolerance: f64) -> Geometry<f64> {
    match geometry {
        Geometry::Polygon(polygon) => Geometry::Polygon(polygon.simplify(&tolerance)),
        Geometry::MultiPolygon(polygons) => Geometry::MultiPolygon(polygons.simplify(&tolerance)),
        other => other,
    }
}

fn reproject_geographic(geometry: Geometry<f64>, projection: &MetricProjection) -> Geometry<f64> {
    geometry.map_coords(|c| {
        let (lon, lat) = projection.to_geographic(c.x, c.y);
        coord! { x: lon, y: lat }
    })
}
