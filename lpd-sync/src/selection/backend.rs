//! Remote selection store access

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::integrity::IntegrityEnvelope;
use crate::error::{Result, SyncError};

/// Selections as returned by the remote store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSelections {
    #[serde(default)]
    pub selected_paths: Vec<String>,
    #[serde(default)]
    pub selection_count: Option<usize>,
    #[serde(default)]
    pub integrity: Option<IntegrityEnvelope>,
}

/// Body of a selection write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSelectionsRequest {
    pub selected_paths: Vec<String>,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<IntegrityEnvelope>,
}

#[derive(Debug, Clone, Deserialize)]
struct LoadResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    selections: Option<StoredSelections>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SaveResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Where selections are loaded from and written to
#[async_trait]
pub trait SelectionBackend: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<StoredSelections>;

    async fn save(&self, request: &SaveSelectionsRequest) -> Result<()>;
}

/// Selection store behind the learning API
pub struct HttpSelectionBackend {
    http_client: reqwest::Client,
    url: String,
}

impl HttpSelectionBackend {
    pub fn new(http_client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http_client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl SelectionBackend for HttpSelectionBackend {
    async fn load(&self, user_id: &str) -> Result<StoredSelections> {
        let response = self
            .http_client
            .get(&self.url)
            .query(&[("userId", user_id)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Transport {
                status: status.as_u16(),
            });
        }

        let body: LoadResponse = response.json().await?;
        if !body.success {
            return Err(SyncError::Rejected(
                body.error.unwrap_or_else(|| "selection load unsuccessful".to_string()),
            ));
        }

        let selections = body.selections.unwrap_or_default();
        debug!(
            user_id,
            count = selections.selected_paths.len(),
            "Loaded selections from server"
        );
        Ok(selections)
    }

    async fn save(&self, request: &SaveSelectionsRequest) -> Result<()> {
        let response = self.http_client.post(&self.url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Transport {
                status: status.as_u16(),
            });
        }

        let body: SaveResponse = response.json().await?;
        if !body.success {
            return Err(SyncError::Rejected(
                body.error.unwrap_or_else(|| "selection save rejected".to_string()),
            ));
        }

        debug!(
            count = request.selected_paths.len(),
            filename = body.filename.as_deref().unwrap_or(""),
            "Saved selections to server"
        );
        Ok(())
    }
}
