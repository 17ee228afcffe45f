use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::{sort_listing, DataSource, DatasetEntry, FetchError, RawRows};
use crate::config::Config;
use crate::pivot::DatasetId;

/// Talks to the log server: `GET /available` and `GET /download/{id}`.
pub struct HttpSource {
    client: Client,
    base: Url,
    buster: String,
}

#[derive(Deserialize, Debug)]
struct AvailableResponse {
    paths: Vec<(DatasetId, String)>,
}

impl HttpSource {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.fetch_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base: cfg.server_url()?,
            buster: cfg.buster.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        self.base
            .join(path)
            .map_err(|e| FetchError::Decode(format!("bad endpoint {}: {}", path, e)))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl DataSource for HttpSource {
    async fn list(&self) -> Result<Vec<DatasetEntry>, FetchError> {
        let resp: AvailableResponse = self.get_json(self.endpoint("available")?).await?;
        Ok(sort_listing(
            resp.paths
                .into_iter()
                .map(|(id, path)| DatasetEntry { id, path })
                .collect(),
        ))
    }

    async fn fetch_rows(&self, id: DatasetId) -> Result<RawRows, FetchError> {
        let url = self.endpoint(&format!("download/{}", id))?;
        match self.get_json::<RawRows>(url).await {
            Err(FetchError::Status { status: 404, .. }) => Err(FetchError::UnknownDataset(id)),
            other => other,
        }
    }

    async fn cache_token(&self, _id: DatasetId) -> Result<String, FetchError> {
        Ok(self.buster.clone())
    }
}
