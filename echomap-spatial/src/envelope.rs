//! Result serialization: filtered, reprojected records into the canonical
//! feature-collection + mask + summary envelope.
//!
//! Pure mapping; all geometric work (simplification, reprojection) has
//! already happened in the engine by the time geometry reaches this module.

use geojson::{Feature, FeatureCollection};
use serde::Serialize;
use serde_json::Map;

use geo_types::MultiPolygon;

use crate::kinds::AttributeSchema;
use crate::store::FeatureRecord;

/// Echo of the grid parameters a query ran with.
#[derive(Debug, Clone, Serialize)]
pub struct GridEcho {
    pub res: u8,
    pub k: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
}

/// Query summary reported alongside the features.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub count: usize,
    pub h3: GridEcho,
    pub select_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ring_selected: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filtered_types: Option<Vec<String>>,
    pub truncated: bool,
}

/// The output of one query: features and mask in geographic coordinates,
/// plus the summary. Constructed per call, never cached.
#[derive(Debug, Serialize)]
pub struct ResultEnvelope {
    pub features: FeatureCollection,
    pub mask: FeatureCollection,
    pub summary: Summary,
}

/// Assemble the envelope from reprojected records and mask geometry.
pub fn build(
    schema: &AttributeSchema,
    records: &[FeatureRecord],
    mask: &MultiPolygon<f64>,
    summary: Summary,
) -> ResultEnvelope {
    let features = records
        .iter()
        .map(|record| Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(
                &record.geometry,
            ))),
            id: None,
            properties: Some(forwarded_properties(schema, record)),
            foreign_members: None,
        })
        .collect();

    // One polygon feature; a multi-part mask stays one feature as a
    // MultiPolygon.
    let mask_value = if mask.0.len() == 1 {
        geojson::Value::from(&mask.0[0])
    } else {
        geojson::Value::from(mask)
    };
    let mask_feature = Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(mask_value)),
        id: None,
        properties: Some(Map::new()),
        foreign_members: None,
    };

    ResultEnvelope {
        features: FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        },
        mask: FeatureCollection {
            bbox: None,
            features: vec![mask_feature],
            foreign_members: None,
        },
        summary,
    }
}

fn forwarded_properties(
    schema: &AttributeSchema,
    record: &FeatureRecord,
) -> Map<String, serde_json::Value> {
    match schema {
        AttributeSchema::All => record.attributes.clone(),
        AttributeSchema::Only(columns) => columns
            .iter()
            .map(|column| {
                let value = record
                    .attributes
                    .get(*column)
                    .cloned()
                    .unwrap_or(serde_json::Value::Null);
                (column.to_string(), value)
            })
            .collect(),
    }
}
