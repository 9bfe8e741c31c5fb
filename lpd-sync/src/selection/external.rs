//! Cross-process selection change signal

use serde::{Deserialize, Serialize};

/// Durable key under which selections are shared between processes
pub const SELECTION_KEY: &str = "selectedLearningPaths";

/// Notification that another process rewrote a durable key
///
/// Values are the JSON array form of the selection; `None` means the key
/// was removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalChange {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl ExternalChange {
    /// Change of the selection key
    pub fn selection(old_value: Option<String>, new_value: Option<String>) -> Self {
        Self {
            key: SELECTION_KEY.to_string(),
            old_value,
            new_value,
        }
    }

    pub fn is_selection_change(&self) -> bool {
        self.key == SELECTION_KEY
    }
}
