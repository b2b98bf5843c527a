//! Remote catalog retrieval.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::{debug, instrument};

use worldpop_common::{WorldPopError, WorldPopResult};

/// Default WorldPop data host.
pub const DEFAULT_BASE_URL: &str = "https://data.worldpop.org";

/// Catalog CSV path relative to the data host.
pub const CATALOG_PATH: &str = "assets/wpgpDatasets.csv";

/// Published MD5 of the catalog CSV, relative to the data host.
pub const CATALOG_HASH_PATH: &str = "assets/wpgpDatasets.md5";

/// Where the raw catalog and its published hash come from.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch the published MD5 digest of the catalog (hex, lower case).
    async fn fetch_hash(&self) -> WorldPopResult<String>;

    /// Fetch the raw catalog CSV body.
    async fn fetch_catalog(&self) -> WorldPopResult<Bytes>;
}

/// Extract the digest from a `wpgpDatasets.md5` body (first whitespace-separated token).
pub fn parse_hash_file(content: &str) -> WorldPopResult<String> {
    content
        .split_whitespace()
        .next()
        .map(str::to_lowercase)
        .ok_or_else(|| WorldPopError::integrity("published catalog hash file is empty"))
}

/// Anonymous HTTPS retrieval from the WorldPop data host.
#[derive(Debug, Clone)]
pub struct HttpCatalogSource {
    client: Client,
    base_url: String,
}

impl HttpCatalogSource {
    pub fn new(base_url: impl Into<String>) -> WorldPopResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| WorldPopError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> WorldPopResult<Bytes> {
        let url = self.url(path);
        let network_error = |message: String| WorldPopError::TransientNetwork {
            url: url.clone(),
            attempts: 1,
            message,
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| network_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(network_error(format!("HTTP error: {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| network_error(e.to_string()))?;
        debug!(url = %url, bytes = body.len(), "Fetched catalog resource");
        Ok(body)
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn fetch_hash(&self) -> WorldPopResult<String> {
        let body = self.get(CATALOG_HASH_PATH).await?;
        parse_hash_file(&String::from_utf8_lossy(&body))
    }

    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn fetch_catalog(&self) -> WorldPopResult<Bytes> {
        self.get(CATALOG_PATH).await
    }
}
