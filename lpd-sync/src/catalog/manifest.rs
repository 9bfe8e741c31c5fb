//! Catalog payload parsing
//!
//! Payload shape: `{ "descriptors": [PathRecord...], "checksum": "...",
//! "generatedAt": "RFC 3339" }`. Only `descriptors` is required.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::warn;

use crate::error::{Result, SyncError};
use crate::model::{CatalogSnapshot, PathRecord};

/// Parse a catalog payload into a snapshot
///
/// Checksum fallback chain: `checksum`, then `generatedAt`, then a SHA-256
/// over the accepted descriptors.
pub fn parse(body: Value) -> Result<CatalogSnapshot> {
    let Value::Object(mut fields) = body else {
        return Err(SyncError::MalformedCatalog(
            "catalog body is not a JSON object".to_string(),
        ));
    };

    let descriptors = match fields.remove("descriptors") {
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(SyncError::MalformedCatalog(
                "descriptors is not a list".to_string(),
            ))
        }
        None => {
            return Err(SyncError::MalformedCatalog(
                "descriptors list missing".to_string(),
            ))
        }
    };

    let records = descriptors
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value::<PathRecord>(item).map_err(|e| {
                SyncError::MalformedCatalog(format!("descriptor {}: {}", index, e))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let paths = sanitize(records);

    let generated_raw = fields
        .get("generatedAt")
        .and_then(Value::as_str)
        .filter(|raw| !raw.trim().is_empty())
        .map(str::to_string);
    let generated_at = generated_raw.as_deref().and_then(parse_timestamp);

    let checksum = fields
        .get("checksum")
        .and_then(Value::as_str)
        .filter(|raw| !raw.trim().is_empty())
        .map(str::to_string)
        .or(generated_raw)
        .unwrap_or_else(|| derive_checksum(&paths));

    Ok(CatalogSnapshot {
        paths,
        checksum,
        generated_at,
    })
}

/// Drop records with empty ids and keep the first of duplicate ids
pub fn sanitize(records: Vec<PathRecord>) -> Vec<PathRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| {
            if record.id.trim().is_empty() {
                warn!(title = %record.title, "Skipping descriptor without id");
                return false;
            }
            if !seen.insert(record.id.clone()) {
                warn!(path_id = %record.id, "Skipping duplicate descriptor");
                return false;
            }
            true
        })
        .collect()
}

/// Hex SHA-256 over the JSON form of `paths`
pub fn derive_checksum(paths: &[PathRecord]) -> String {
    let serialized = serde_json::to_vec(paths).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&serialized);
    format!("{:x}", hasher.finalize())
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(timestamp) => Some(timestamp.with_timezone(&Utc)),
        Err(e) => {
            warn!(generated_at = raw, error = %e, "Ignoring unparseable catalog timestamp");
            None
        }
    }
}
