//! Where catalog payloads come from

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, SyncError};

/// Fetches the raw catalog payload
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch(&self) -> Result<Value>;
}

/// Catalog served by the learning API manifest endpoint
pub struct HttpCatalogSource {
    http_client: reqwest::Client,
    url: String,
}

impl HttpCatalogSource {
    pub fn new(http_client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http_client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn fetch(&self) -> Result<Value> {
        debug!(url = %self.url, "Fetching catalog");

        let response = self.http_client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Transport {
                status: status.as_u16(),
            });
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_decode() {
                SyncError::MalformedCatalog(format!("catalog body is not JSON: {}", e))
            } else {
                SyncError::from(e)
            }
        })
    }
}
