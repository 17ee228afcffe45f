use anyhow::{anyhow, Result};
use std::path::PathBuf;
use url::Url;

use crate::retry::RetryConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Http,
    Dir,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub source: SourceKind,
    pub server: String,
    pub data_dir: PathBuf,
    /// Empty string disables the durable cache.
    pub cache_path: String,
    pub buster: String,
    pub fetch_retries: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub fetch_timeout_secs: u64,
    pub x_column: String,
    pub y_column: String,
    pub min_dist: f64,
    pub chart_width: f64,
    pub chart_height: f64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            source: match std::env::var("EGGVIZ_SOURCE").as_deref() {
                Ok("dir") => SourceKind::Dir,
                _ => SourceKind::Http,
            },
            server: std::env::var("EGGVIZ_SERVER").unwrap_or_else(|_| "http://localhost:8080".to_string()),
            data_dir: PathBuf::from(std::env::var("EGGVIZ_DIR").unwrap_or_else(|_| ".".to_string())),
            cache_path: std::env::var("EGGVIZ_CACHE").unwrap_or_else(|_| "./eggviz-cache.sqlite".to_string()),
            buster: std::env::var("EGGVIZ_BUSTER").unwrap_or_default(),
            fetch_retries: env_or("FETCH_RETRIES", 3),
            retry_base_ms: env_or("RETRY_BASE_MS", 100),
            retry_max_ms: env_or("RETRY_MAX_MS", 5000),
            fetch_timeout_secs: env_or("FETCH_TIMEOUT_SECS", 30),
            x_column: std::env::var("X_COLUMN").unwrap_or_else(|_| "index".to_string()),
            y_column: std::env::var("Y_COLUMN").unwrap_or_else(|_| "cost".to_string()),
            min_dist: env_or("MIN_DIST", 5.0),
            chart_width: env_or("CHART_WIDTH", 800.0),
            chart_height: env_or("CHART_HEIGHT", 600.0),
        }
    }

    pub fn server_url(&self) -> Result<Url> {
        let url = Url::parse(&self.server).map_err(|e| anyhow!("invalid EGGVIZ_SERVER {}: {}", self.server, e))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(anyhow!("unsupported scheme {} in {}", other, self.server)),
        }
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.fetch_retries,
            base_delay_ms: self.retry_base_ms,
            max_delay_ms: self.retry_max_ms,
            ..RetryConfig::default()
        }
    }

    pub fn cache_enabled(&self) -> bool {
        !self.cache_path.is_empty()
    }
}
