//! Change-notification channel abstraction

use async_trait::async_trait;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::Result;

/// Payload announcing a new catalog version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotice {
    /// Checksum of the catalog the server now holds
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub descriptor_count: Option<usize>,
    #[serde(default)]
    pub version: Option<serde_json::Value>,
}

/// What an open channel can report
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The channel is established
    Open,
    /// The remote catalog changed
    CatalogChanged(ChangeNotice),
    /// The channel failed; it is closed after this
    Error(String),
}

/// Events of one channel; the stream ending means the channel closed
pub type ChannelStream = Pin<Box<dyn Stream<Item = ChannelEvent> + Send>>;

/// Opens change-notification channels
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Open a new channel; an error counts as a channel failure
    async fn connect(&self) -> Result<ChannelStream>;
}
