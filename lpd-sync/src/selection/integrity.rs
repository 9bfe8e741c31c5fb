//! Checksum envelope for persisted selections
//!
//! Detection only: a mismatch is reported, never repaired.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, SyncError};
use crate::model::SelectionSet;

/// Envelope format written by this engine
pub const ENVELOPE_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityEnvelope {
    /// Selected ids, in serialized order
    pub data: Vec<String>,
    /// Hex SHA-256 of the JSON array form of `data`
    pub checksum: String,
    /// Milliseconds since the Unix epoch at write time
    pub timestamp: i64,
    pub version: u32,
}

impl IntegrityEnvelope {
    /// Wrap the current selection
    pub fn seal(selection: &SelectionSet) -> Self {
        let data = selection.to_vec();
        Self {
            checksum: checksum_of(&data),
            data,
            timestamp: Utc::now().timestamp_millis(),
            version: ENVELOPE_VERSION,
        }
    }

    /// Check the checksum and that `selected` matches the sealed data
    pub fn verify(&self, selected: &SelectionSet) -> Result<()> {
        let expected = checksum_of(&self.data);
        if expected != self.checksum {
            return Err(SyncError::Integrity(format!(
                "checksum mismatch (expected {}, stored {})",
                expected, self.checksum
            )));
        }

        let sealed: SelectionSet = self.data.iter().map(String::as_str).collect();
        if &sealed != selected {
            return Err(SyncError::Integrity(
                "selection differs from sealed data".to_string(),
            ));
        }
        Ok(())
    }
}

fn checksum_of(data: &[String]) -> String {
    let serialized = serde_json::Value::from(data.to_vec()).to_string();
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    format!("{:x}", hasher.finalize())
}
