//! Base-layer store: lazily loaded, CRS-normalized, spatially indexed
//! feature collections.
//!
//! One [`LayerStore`] exists per analyzer kind and owns its records for the
//! process lifetime. The store starts `Unloaded`; the first query performs
//! a single-flight load (write-lock double check), after which the snapshot
//! is immutable and concurrent readers only take the read lock. A failed
//! load leaves the store `Unloaded` and surfaces a
//! [`AnalysisError::DataSource`]; later calls re-attempt from scratch, so a
//! layer that appears after a delayed sync becomes readable without a
//! restart.
//!
//! Layers are GeoJSON FeatureCollections under
//! `<data_dir>/<dataset>/<layer>.geojson`. Geometry arrives either already
//! in the metric CRS or in geographic coordinates flagged by the legacy
//! `crs` member, and is normalized to metric at load. Kinds backed by
//! several sub-layers (stations, mesh/parcels) normalize each sub-layer
//! independently and concatenate before indexing; every record is tagged
//! with its source layer name.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use geo::{BoundingRect, HasDimensions, MapCoords};
use geo_types::{coord, Geometry, Rect};
use geojson::GeoJson;
use parking_lot::RwLock;
use rstar::{RTree, RTreeObject, AABB};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::error::{AnalysisError, Result};
use crate::kinds::{AttributeSchema, KindConfig};
use crate::transform::MetricProjection;

/// Attribute key carrying the source sub-layer of each record.
pub const SOURCE_LAYER_ATTRIBUTE: &str = "layer";

/// One row of a base layer: a geometry in the metric CRS plus its retained
/// attributes. Never mutated after load.
#[derive(Debug, Clone)]
pub struct FeatureRecord {
    pub geometry: Geometry<f64>,
    pub attributes: Map<String, Value>,
}

/// R-tree entry: a record's bounding box and its index into the record
/// vector.
#[derive(Debug, Clone, Copy)]
struct IndexedRecord {
    lower: [f64; 2],
    upper: [f64; 2],
    idx: usize,
}

impl RTreeObject for IndexedRecord {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.lower, self.upper)
    }
}

/// Immutable, indexed view of a loaded base layer.
#[derive(Debug)]
pub struct LayerSnapshot {
    records: Vec<FeatureRecord>,
    tree: RTree<IndexedRecord>,
}

impl LayerSnapshot {
    /// Index a set of records.
    pub fn new(records: Vec<FeatureRecord>) -> Self {
        let entries: Vec<IndexedRecord> = records
            .iter()
            .enumerate()
            .filter_map(|(idx, record)| {
                let rect = record.geometry.bounding_rect()?;
                Some(IndexedRecord {
                    lower: [rect.min().x, rect.min().y],
                    upper: [rect.max().x, rect.max().y],
                    idx,
                })
            })
            .collect();
        Self {
            records,
            tree: RTree::bulk_load(entries),
        }
    }

    /// Indices of records whose bounding box intersects the query box, in
    /// ascending record order. Over-inclusive by design; never misses a
    /// record whose exact geometry intersects anything inside the box.
    pub fn candidates(&self, bbox: &Rect<f64>) -> Vec<usize> {
        let envelope = AABB::from_corners(
            [bbox.min().x, bbox.min().y],
            [bbox.max().x, bbox.max().y],
        );
        let mut indices: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.idx)
            .collect();
        indices.sort_unstable();
        indices
    }

    /// Random access by record index.
    pub fn record(&self, idx: usize) -> Option<&FeatureRecord> {
        self.records.get(idx)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Capability interface the query engine is written against: lazy load,
/// cheap bounding-box prefilter, random access by index.
pub trait BaseLayer: Send + Sync {
    /// Idempotent load. At most one load runs at a time; concurrent callers
    /// wait for its outcome. Failures are not cached.
    fn ensure_loaded(&self) -> Result<()>;

    /// Indices of records whose bounding box intersects `bbox`.
    fn candidates(&self, bbox: &Rect<f64>) -> Result<Vec<usize>>;

    /// Fetch records by index, preserving the given order.
    fn records_at(&self, indices: &[usize]) -> Result<Vec<FeatureRecord>>;
}

/// File-backed [`BaseLayer`] for one analyzer kind.
pub struct LayerStore {
    label: String,
    data_dir: PathBuf,
    dataset: &'static str,
    layers: &'static [&'static str],
    retention: Retention,
    projection: Arc<MetricProjection>,
    state: RwLock<Option<Arc<LayerSnapshot>>>,
}

/// Which attribute columns survive the load.
#[derive(Debug, Clone)]
enum Retention {
    All,
    Only(Vec<&'static str>),
}

impl Retention {
    fn keeps(&self, key: &str) -> bool {
        match self {
            Retention::All => true,
            Retention::Only(keys) => keys.iter().any(|kept| *kept == key),
        }
    }
}

impl LayerStore {
    /// Build the store for an analyzer kind rooted at `data_dir`.
    pub fn for_kind(
        kind: &KindConfig,
        data_dir: impl Into<PathBuf>,
        projection: Arc<MetricProjection>,
    ) -> Self {
        let retention = match kind.attributes {
            AttributeSchema::All => Retention::All,
            AttributeSchema::Only(columns) => {
                let mut keys: Vec<&'static str> = columns.to_vec();
                if let Some(column) = kind.filter_column {
                    if !keys.contains(&column) {
                        keys.push(column);
                    }
                }
                Retention::Only(keys)
            }
        };
        Self {
            label: kind.name.to_string(),
            data_dir: data_dir.into(),
            dataset: kind.dataset,
            layers: kind.layers,
            retention,
            projection,
            state: RwLock::new(None),
        }
    }

    /// Loaded snapshot, loading on first use (single-flight).
    pub fn snapshot(&self) -> Result<Arc<LayerSnapshot>> {
        if let Some(snapshot) = self.state.read().as_ref() {
            return Ok(snapshot.clone());
        }
        let mut guard = self.state.write();
        if let Some(snapshot) = guard.as_ref() {
            return Ok(snapshot.clone());
        }
        let snapshot = Arc::new(self.load_layers()?);
        *guard = Some(snapshot.clone());
        Ok(snapshot)
    }

    fn load_layers(&self) -> Result<LayerSnapshot> {
        let mut records = Vec::new();
        for &layer in self.layers {
            let path = self
                .data_dir
                .join(self.dataset)
                .join(format!("{layer}.geojson"));
            let layer_records = read_layer(&path, layer, &self.projection, &self.retention)?;
            debug!(
                store = self.label.as_str(),
                layer, count = layer_records.len(),
                "layer normalized"
            );
            records.extend(layer_records);
        }
        info!(
            store = self.label.as_str(),
            records = records.len(),
            "base layer loaded and indexed"
        );
        Ok(LayerSnapshot::new(records))
    }
}

impl BaseLayer for LayerStore {
    fn ensure_loaded(&self) -> Result<()> {
        self.snapshot().map(|_| ())
    }

    fn candidates(&self, bbox: &Rect<f64>) -> Result<Vec<usize>> {
        Ok(self.snapshot()?.candidates(bbox))
    }

    fn records_at(&self, indices: &[usize]) -> Result<Vec<FeatureRecord>> {
        let snapshot = self.snapshot()?;
        Ok(indices
            .iter()
            .filter_map(|&idx| snapshot.record(idx).cloned())
            .collect())
    }
}

/// Coordinate reference system a layer file declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LayerCrs {
    Geographic,
    Metric,
}

/// Read and normalize one layer file.
fn read_layer(
    path: &Path,
    layer: &str,
    projection: &MetricProjection,
    retention: &Retention,
) -> Result<Vec<FeatureRecord>> {
    let source = path.display().to_string();
    let raw = std::fs::read_to_string(path)
        .map_err(|e| AnalysisError::data_source(&source, e.to_string()))?;
    let parsed: GeoJson = raw
        .parse()
        .map_err(|e: geojson::Error| AnalysisError::data_source(&source, e.to_string()))?;
    let collection = match parsed {
        GeoJson::FeatureCollection(collection) => collection,
        _ => {
            return Err(AnalysisError::data_source(
                &source,
                "layer is not a FeatureCollection",
            ))
        }
    };

    let crs = declared_crs(collection.foreign_members.as_ref(), &source)?;

    let mut records = Vec::with_capacity(collection.features.len());
    for feature in collection.features {
        let Some(geometry) = feature.geometry else {
            continue;
        };
        let geometry = Geometry::<f64>::try_from(geometry)
            .map_err(|e| AnalysisError::data_source(&source, e.to_string()))?;
        if geometry.is_empty() {
            continue;
        }
        let geometry = match crs {
            LayerCrs::Metric => geometry,
            LayerCrs::Geographic => geometry.map_coords(|c| {
                let (x, y) = projection.to_metric(c.x, c.y);
                coord! { x: x, y: y }
            }),
        };

        let mut attributes: Map<String, Value> = feature
            .properties
            .unwrap_or_default()
            .into_iter()
            .filter(|(key, _)| retention.keeps(key))
            .collect();
        attributes.insert(SOURCE_LAYER_ATTRIBUTE.to_string(), json!(layer));

        records.push(FeatureRecord {
            geometry,
            attributes,
        });
    }
    Ok(records)
}

/// Resolve the layer's declared CRS.
///
/// A `crs` member naming EPSG:4326 means geographic input that needs
/// reprojection; EPSG:7855 or no declaration at all is taken as already
/// metric, mirroring the set-if-absent normalization of the upstream
/// datasets. Anything else cannot be reconciled.
fn declared_crs(foreign: Option<&Map<String, Value>>, source: &str) -> Result<LayerCrs> {
    let Some(name) = foreign
        .and_then(|members| members.get("crs"))
        .and_then(|crs| crs.get("properties"))
        .and_then(|properties| properties.get("name"))
        .and_then(Value::as_str)
    else {
        return Ok(LayerCrs::Metric);
    };
    if name.contains("4326") || name.contains("CRS84") {
        Ok(LayerCrs::Geographic)
    } else if name.contains("7855") {
        Ok(LayerCrs::Metric)
    } else {
        Err(AnalysisError::data_source(
            source,
            format!("unsupported layer CRS {name}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds;
    use std::fs;
    use tempfile::TempDir;

    fn write_layer(dir: &TempDir, name: &str, body: &str) {
        let dataset = dir.path().join("master");
        fs::create_dir_all(&dataset).unwrap();
        fs::write(dataset.join(format!("{name}.geojson")), body).unwrap();
    }

    fn point_collection(crs: Option<&str>, points: &[(f64, f64, &str)]) -> String {
        let features: Vec<String> = points
            .iter()
            .map(|(x, y, ftype)| {
                format!(
                    r#"{{"type":"Feature","geometry":{{"type":"Point","coordinates":[{x},{y}]}},"properties":{{"FTYPE":"{ftype}","UFI":1,"IGNORED":"x"}}}}"#
                )
            })
            .collect();
        let crs = crs
            .map(|name| {
                format!(r#","crs":{{"type":"name","properties":{{"name":"{name}"}}}}"#)
            })
            .unwrap_or_default();
        format!(
            r#"{{"type":"FeatureCollection","features":[{}]{}}}"#,
            features.join(","),
            crs
        )
    }

    #[test]
    fn load_retains_declared_columns_and_tags_layer() {
        let dir = TempDir::new().unwrap();
        write_layer(&dir, "pois", &point_collection(None, &[(320_000.0, 5_810_000.0, "CAFE")]));

        let store = LayerStore::for_kind(
            &kinds::pois(),
            dir.path(),
            Arc::new(MetricProjection::new()),
        );
        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.len(), 1);
        let record = snapshot.record(0).unwrap();
        assert_eq!(record.attributes["FTYPE"], json!("CAFE"));
        assert_eq!(record.attributes["UFI"], json!(1));
        assert_eq!(record.attributes[SOURCE_LAYER_ATTRIBUTE], json!("pois"));
        assert!(!record.attributes.contains_key("IGNORED"));
    }

    #[test]
    fn geographic_layers_are_reprojected_to_metric() {
        let dir = TempDir::new().unwrap();
        write_layer(
            &dir,
            "pois",
            &point_collection(Some("urn:ogc:def:crs:EPSG::4326"), &[(144.9631, -37.8136, "CAFE")]),
        );

        let projection = Arc::new(MetricProjection::new());
        let store = LayerStore::for_kind(&kinds::pois(), dir.path(), projection.clone());
        let snapshot = store.snapshot().unwrap();
        let Geometry::Point(p) = &snapshot.record(0).unwrap().geometry else {
            panic!("expected point");
        };
        let (x, y) = projection.to_metric(144.9631, -37.8136);
        assert!((p.x() - x).abs() < 1e-6 && (p.y() - y).abs() < 1e-6);
    }

    #[test]
    fn unknown_crs_is_a_data_source_error() {
        let dir = TempDir::new().unwrap();
        write_layer(
            &dir,
            "pois",
            &point_collection(Some("urn:ogc:def:crs:EPSG::3857"), &[(0.0, 0.0, "CAFE")]),
        );
        let store = LayerStore::for_kind(
            &kinds::pois(),
            dir.path(),
            Arc::new(MetricProjection::new()),
        );
        assert!(matches!(
            store.snapshot().unwrap_err(),
            AnalysisError::DataSource { .. }
        ));
    }

    #[test]
    fn failed_load_is_reattempted_not_cached() {
        let dir = TempDir::new().unwrap();
        let store = LayerStore::for_kind(
            &kinds::pois(),
            dir.path(),
            Arc::new(MetricProjection::new()),
        );

        // Layer file not synced yet: every attempt re-raises DataSource.
        assert!(matches!(
            store.snapshot().unwrap_err(),
            AnalysisError::DataSource { .. }
        ));
        assert!(matches!(
            store.snapshot().unwrap_err(),
            AnalysisError::DataSource { .. }
        ));

        // Once the file appears the same store loads without a restart.
        write_layer(&dir, "pois", &point_collection(None, &[(1.0, 2.0, "CAFE")]));
        assert_eq!(store.snapshot().unwrap().len(), 1);
    }

    #[test]
    fn snapshot_is_loaded_once_and_shared() {
        let dir = TempDir::new().unwrap();
        write_layer(&dir, "pois", &point_collection(None, &[(1.0, 2.0, "CAFE")]));
        let store = LayerStore::for_kind(
            &kinds::pois(),
            dir.path(),
            Arc::new(MetricProjection::new()),
        );
        let a = store.snapshot().unwrap();
        let b = store.snapshot().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn sub_layers_concatenate_with_tags() {
        let dir = TempDir::new().unwrap();
        write_layer(
            &dir,
            "metro_stations",
            r#"{"type":"FeatureCollection","features":[{"type":"Feature","geometry":{"type":"Point","coordinates":[1.0,2.0]},"properties":{"NAME":"Flinders"}}]}"#,
        );
        write_layer(
            &dir,
            "regional_stations",
            r#"{"type":"FeatureCollection","features":[{"type":"Feature","geometry":{"type":"Point","coordinates":[3.0,4.0]},"properties":{"NAME":"Ballarat"}}]}"#,
        );
        let store = LayerStore::for_kind(
            &kinds::stations(),
            dir.path(),
            Arc::new(MetricProjection::new()),
        );
        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.len(), 2);
        let layers: Vec<&Value> = (0..2)
            .map(|i| &snapshot.record(i).unwrap().attributes[SOURCE_LAYER_ATTRIBUTE])
            .collect();
        assert_eq!(layers, [&json!("metro_stations"), &json!("regional_stations")]);
    }

    #[test]
    fn candidates_prefilter_never_misses() {
        use geo::Intersects;

        let mut records = Vec::new();
        for i in 0..20 {
            let x = 1_000.0 * i as f64;
            records.push(FeatureRecord {
                geometry: Geometry::Point(geo_types::Point::new(x, x / 2.0)),
                attributes: Map::new(),
            });
        }
        let snapshot = LayerSnapshot::new(records);
        let query = Rect::new(coord! { x: 2_500.0, y: 0.0 }, coord! { x: 9_000.0, y: 9_000.0 });
        let candidates = snapshot.candidates(&query);

        let query_poly = query.to_polygon();
        for idx in 0..snapshot.len() {
            let record = snapshot.record(idx).unwrap();
            if record.geometry.intersects(&query_poly) {
                assert!(candidates.contains(&idx), "index dropped record {idx}");
            }
        }
        // Ascending order keeps downstream truncation deterministic.
        let mut sorted = candidates.clone();
        sorted.sort_unstable();
        assert_eq!(candidates, sorted);
    }
}
