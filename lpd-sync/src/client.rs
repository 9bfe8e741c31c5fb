//! Shared reqwest client construction

use std::time::Duration;

use crate::error::{Result, SyncError};

const USER_AGENT: &str = concat!("lpd-sync/", env!("CARGO_PKG_VERSION"));

/// Client for request/response endpoints (catalog, selections)
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| SyncError::Network(e.to_string()))
}

/// Client for the long-lived change stream
///
/// Only the connect phase is bounded; a total request timeout would cut
/// off a healthy event stream.
pub fn stream_client(connect_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| SyncError::Network(e.to_string()))
}
