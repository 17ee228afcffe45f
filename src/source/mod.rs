use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{Config, SourceKind};
use crate::pivot::DatasetId;
use crate::retry::{is_retryable_http_status, is_retryable_network_error, Retryable};

mod dir;
mod http;

pub use dir::{file_sha256, split_csv_line, DirSource};
pub use http::HttpSource;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} returned status {status}")]
    Status { status: u16, url: String },
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown dataset {0}")]
    UnknownDataset(DatasetId),
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Http(e) => is_retryable_network_error(e),
            FetchError::Status { status, .. } => is_retryable_http_status(*status),
            FetchError::Io(_) => true,
            FetchError::Decode(_) | FetchError::UnknownDataset(_) => false,
        }
    }
}

/// One entry of the dataset listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub id: DatasetId,
    pub path: String,
}

/// Raw long-format rows for one dataset. The header ends with the reserved
/// name and value columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRows {
    pub path: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Where datasets come from.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Known datasets, sorted ascending by id.
    async fn list(&self) -> Result<Vec<DatasetEntry>, FetchError>;

    async fn fetch_rows(&self, id: DatasetId) -> Result<RawRows, FetchError>;

    /// Token under which a built table may be cached. A different token
    /// invalidates whatever was stored before.
    async fn cache_token(&self, id: DatasetId) -> Result<String, FetchError>;
}

pub fn sort_listing(mut entries: Vec<DatasetEntry>) -> Vec<DatasetEntry> {
    entries.sort_by_key(|e| e.id);
    entries
}

pub fn from_config(cfg: &Config) -> anyhow::Result<Box<dyn DataSource>> {
    match cfg.source {
        SourceKind::Http => Ok(Box::new(HttpSource::new(cfg)?)),
        SourceKind::Dir => Ok(Box::new(DirSource::new(cfg.data_dir.clone()))),
    }
}
