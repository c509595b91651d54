//! Base-layer dataset synchronization.
//!
//! Downloads the layer files the analyzers read from a Supabase-style
//! object storage bucket into the local data directory. Runs once at
//! process start when enabled; the analyzers themselves never touch the
//! network.
//!
//! An object is fetched when the local copy is missing or its size differs
//! from the listed remote size. Individual object failures are warnings:
//! the sync is best-effort and the stores re-raise a data-source error for
//! anything that never arrived. Only misconfiguration (no storage URL or
//! key) and an unreachable listing endpoint fail the sync as a whole.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Timeout for storage HTTP requests (connect + response).
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Sync errors.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Required configuration is missing.
    #[error("sync configuration error: {0}")]
    Config(String),

    /// HTTP transport failure.
    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Local filesystem failure.
    #[error("local write failed: {0}")]
    Io(#[from] std::io::Error),

    /// The storage API answered with something unexpected.
    #[error("unexpected storage response: {0}")]
    Format(String),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Storage sync configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Storage service base URL (no trailing slash).
    pub base_url: String,
    /// Service key sent as both Bearer token and `apikey` header.
    pub api_key: String,
    /// Bucket holding the raw dataset.
    pub bucket: String,
    /// Object prefix of the dataset ("folder"), e.g. `master/`.
    pub dataset_prefix: String,
    /// Local directory the dataset is mirrored into.
    pub local_base: PathBuf,
}

impl SyncConfig {
    /// Read configuration from the environment.
    ///
    /// `SUPABASE_URL` and a key (`SUPABASE_SERVICE_KEY` or `SUPABASE_KEY`)
    /// are required; bucket, prefix and local directory have defaults.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("SUPABASE_URL")
            .ok()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| SyncError::Config("SUPABASE_URL not set".into()))?;
        let api_key = std::env::var("SUPABASE_SERVICE_KEY")
            .or_else(|_| std::env::var("SUPABASE_KEY"))
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                SyncError::Config("SUPABASE_SERVICE_KEY (or SUPABASE_KEY) not set".into())
            })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            bucket: std::env::var("RAW_BUCKET").unwrap_or_else(|_| "raw-master".into()),
            dataset_prefix: std::env::var("RAW_DATASET_PREFIX")
                .unwrap_or_else(|_| "master/".into()),
            local_base: std::env::var("LOCAL_DATA_BASE")
                .unwrap_or_else(|_| "data_master".into())
                .into(),
        })
    }
}

/// Outcome of one sync pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncReport {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// One entry of the storage list response.
#[derive(Debug, Deserialize)]
struct ObjectInfo {
    name: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    metadata: Option<ObjectMetadata>,
}

#[derive(Debug, Deserialize)]
struct ObjectMetadata {
    #[serde(default)]
    size: Option<u64>,
}

impl ObjectInfo {
    fn size(&self) -> Option<u64> {
        self.metadata.as_ref().and_then(|m| m.size).or(self.size)
    }
}

fn object_url(config: &SyncConfig, path: &str) -> String {
    format!(
        "{}/storage/v1/object/{}/{}",
        config.base_url, config.bucket, path
    )
}

fn list_url(config: &SyncConfig) -> String {
    format!("{}/storage/v1/object/list/{}", config.base_url, config.bucket)
}

/// Remote object path for a listed name, which the storage API may return
/// either relative to the prefix or fully qualified.
fn remote_path(prefix: &str, name: &str) -> String {
    if name.starts_with(prefix) {
        name.to_string()
    } else {
        format!("{}/{}", prefix.trim_end_matches('/'), name)
    }
}

/// Whether a listed object needs downloading.
///
/// Missing locally, or a known remote size that differs from the local
/// size. An unknown remote size keeps the local copy.
fn needs_download(dest: &Path, remote_size: Option<u64>) -> bool {
    let Ok(meta) = dest.metadata() else {
        return true;
    };
    match remote_size {
        Some(size) => meta.len() != size,
        None => false,
    }
}

/// Mirror every object under the dataset prefix into the local data
/// directory.
pub async fn sync(config: &SyncConfig) -> Result<SyncReport> {
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .connect_timeout(Duration::from_secs(5))
        .build()?;

    std::fs::create_dir_all(&config.local_base)?;

    let objects = list_objects(&client, config).await?;
    info!(
        bucket = config.bucket.as_str(),
        prefix = config.dataset_prefix.as_str(),
        objects = objects.len(),
        "storage listing complete"
    );

    let mut report = SyncReport::default();
    for object in &objects {
        let Some(name) = object.name.as_deref() else {
            continue;
        };
        let remote = remote_path(&config.dataset_prefix, name);
        let dest = config.local_base.join(&remote);
        if !needs_download(&dest, object.size()) {
            debug!(object = remote.as_str(), "up to date");
            report.skipped += 1;
            continue;
        }
        match download_object(&client, config, &remote, &dest).await {
            Ok(bytes) => {
                info!(object = remote.as_str(), bytes, "downloaded");
                report.downloaded += 1;
            }
            Err(e) => {
                warn!(object = remote.as_str(), error = %e, "download failed");
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

async fn list_objects(client: &reqwest::Client, config: &SyncConfig) -> Result<Vec<ObjectInfo>> {
    let response = client
        .post(list_url(config))
        .bearer_auth(&config.api_key)
        .header("apikey", &config.api_key)
        .json(&serde_json::json!({
            "prefix": config.dataset_prefix,
            "limit": 1000,
        }))
        .send()
        .await?
        .error_for_status()?;

    let payload: serde_json::Value = response.json().await?;
    let items = match payload {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut object) => match object.remove("items") {
            Some(serde_json::Value::Array(items)) => items,
            _ => return Err(SyncError::Format("listing has no items array".into())),
        },
        other => return Err(SyncError::Format(format!("listing is {other}"))),
    };
    items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item).map_err(|e| SyncError::Format(e.to_string()))
        })
        .collect()
}

async fn download_object(
    client: &reqwest::Client,
    config: &SyncConfig,
    remote: &str,
    dest: &Path,
) -> Result<u64> {
    let response = client
        .get(object_url(config, remote))
        .bearer_auth(&config.api_key)
        .header("apikey", &config.api_key)
        .send()
        .await?
        .error_for_status()?;
    let bytes = response.bytes().await?;
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(dest, &bytes)?;
    Ok(bytes.len() as u64)
}
