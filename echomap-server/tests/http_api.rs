//! In-process HTTP tests against the full router.

use std::path::Path;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use clap::Parser;
use echomap_server::{EchomapServer, ServerConfig};
use echomap_spatial::MetricProjection;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const CENTER: (f64, f64) = (144.9631, -37.8136); // (lon, lat)

fn write_pois_layer(dir: &Path) {
    let projection = MetricProjection::new();
    let (x, y) = projection.to_metric(CENTER.0, CENTER.1);
    let body = json!({
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [x, y] },
                "properties": { "FTYPE": "CAFE", "UFI": 1 },
            },
            {
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [x + 90_000.0, y] },
                "properties": { "FTYPE": "CAFE", "UFI": 2 },
            },
        ],
    });
    let dataset = dir.join("master");
    std::fs::create_dir_all(&dataset).unwrap();
    std::fs::write(
        dataset.join("pois.geojson"),
        serde_json::to_string(&body).unwrap(),
    )
    .unwrap();
}

fn server(dir: &Path) -> EchomapServer {
    let config = ServerConfig::parse_from([
        "echomap-server",
        "--data-dir",
        dir.to_str().unwrap(),
        "--catalog-path",
        dir.join("master_catalog.json").to_str().unwrap(),
    ]);
    EchomapServer::new(config)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn analyze_pois_returns_the_envelope() {
    let dir = TempDir::new().unwrap();
    write_pois_layer(dir.path());
    let router = server(dir.path()).router();

    let response = router
        .oneshot(post_json(
            "/analyze/pois_h3",
            json!({ "center_lat": CENTER.1, "center_lon": CENTER.0, "res": 8, "k": 2, "disk_k": 1 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let envelope = body_json(response).await;
    assert_eq!(envelope["summary"]["count"], json!(1));
    assert_eq!(envelope["features"]["type"], json!("FeatureCollection"));
    assert_eq!(
        envelope["features"]["features"][0]["properties"]["FTYPE"],
        json!("CAFE")
    );
    assert_eq!(envelope["mask"]["features"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unsupported_resolution_maps_to_bad_request() {
    let dir = TempDir::new().unwrap();
    write_pois_layer(dir.path());
    let router = server(dir.path()).router();

    let response = router
        .oneshot(post_json(
            "/analyze/pois_h3",
            json!({ "center_lat": CENTER.1, "center_lon": CENTER.0, "res": 20 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let error = body_json(response).await;
    assert_eq!(error["status"], json!(400));
    assert!(error["error"].as_str().unwrap().contains("resolution"));
}

#[tokio::test]
async fn missing_base_layer_maps_to_server_error() {
    let dir = TempDir::new().unwrap();
    let router = server(dir.path()).router();

    let response = router
        .oneshot(post_json(
            "/analyze/trains_h3",
            json!({ "center_lat": CENTER.1, "center_lon": CENTER.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn healthz_reports_dataset_presence() {
    let dir = TempDir::new().unwrap();
    write_pois_layer(dir.path());
    let router = server(dir.path()).router();

    let response = router
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["ok"], json!(true));
}

#[tokio::test]
async fn catalog_is_served_or_404s() {
    let dir = TempDir::new().unwrap();
    let router = server(dir.path()).router();

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/config/master_catalog")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    std::fs::write(
        dir.path().join("master_catalog.json"),
        r#"{"layers":["pois"]}"#,
    )
    .unwrap();
    let response = router
        .oneshot(
            Request::builder()
                .uri("/config/master_catalog")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let catalog = body_json(response).await;
    assert_eq!(catalog["layers"], json!(["pois"]));
}
