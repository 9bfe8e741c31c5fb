//! Core data model: path records, catalog snapshots, selections, progress

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

use crate::progress::numeric::normalize_json_value;

/// One step (kata, lab, activity) of a learning path
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    /// Step id, unique within its path
    pub id: String,

    /// Display title
    #[serde(default)]
    pub title: String,

    /// Completion flag as delivered by the catalog
    ///
    /// Only used to seed the completion ledger; progress never reads it
    /// directly.
    #[serde(default, alias = "done")]
    pub completed: bool,
}

/// One learning path as delivered by the remote catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PathRecord {
    /// Unique, non-empty id
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_category")]
    pub category: String,

    /// Ordered steps; empty when the descriptor omits them
    #[serde(default)]
    pub steps: Vec<Step>,

    /// Free-form duration such as "2h", "45 min" or "1.5 days"
    #[serde(default, deserialize_with = "lenient_string")]
    pub estimated_time: Option<String>,

    #[serde(default)]
    pub difficulty: Option<String>,

    /// Path-level completion in percent, used when the path has no steps
    #[serde(default, deserialize_with = "lenient_percentage")]
    pub completion: f64,
}

impl PathRecord {
    /// Minimal record with an id and title
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            category: default_category(),
            steps: Vec::new(),
            estimated_time: None,
            difficulty: None,
            completion: 0.0,
        }
    }

    /// Builder-style helper appending steps
    pub fn with_steps<I, S>(mut self, step_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps.extend(step_ids.into_iter().map(|id| {
            let id = id.into();
            Step {
                title: id.clone(),
                id,
                completed: false,
            }
        }));
        self
    }
}

fn default_category() -> String {
    "General".to_string()
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(text)) => Some(text),
        Some(serde_json::Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

fn lenient_percentage<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(normalize_json_value).unwrap_or(0.0))
}

/// The full catalog as last applied
///
/// Immutable once built; the catalog client swaps whole snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSnapshot {
    pub paths: Vec<PathRecord>,
    pub checksum: String,
    pub generated_at: Option<DateTime<Utc>>,
}

impl CatalogSnapshot {
    /// Look up a path by id
    pub fn path(&self, path_id: &str) -> Option<&PathRecord> {
        self.paths.iter().find(|path| path.id == path_id)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Ids of the paths the user tracks
///
/// Ordered so serialized payloads are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionSet(BTreeSet<String>);

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `path_id` was not yet selected
    pub fn insert(&mut self, path_id: impl Into<String>) -> bool {
        self.0.insert(path_id.into())
    }

    /// Returns true when `path_id` was selected
    pub fn remove(&mut self, path_id: &str) -> bool {
        self.0.remove(path_id)
    }

    pub fn contains(&self, path_id: &str) -> bool {
        self.0.contains(path_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }

    /// Ids in `next` but not in `self`, and ids in `self` but not in `next`
    pub fn diff(&self, next: &SelectionSet) -> (Vec<String>, Vec<String>) {
        let added = next.0.difference(&self.0).cloned().collect();
        let removed = self.0.difference(&next.0).cloned().collect();
        (added, removed)
    }

    /// JSON array form used for the durable selection key
    pub fn to_serialized(&self) -> String {
        serde_json::Value::from(self.to_vec()).to_string()
    }

    /// Parse the JSON array form
    pub fn from_serialized(raw: &str) -> Result<Self, serde_json::Error> {
        let ids: Vec<String> = serde_json::from_str(raw)?;
        Ok(ids.into_iter().collect())
    }
}

impl FromIterator<String> for SelectionSet {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a str> for SelectionSet {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        Self(iter.into_iter().map(str::to_string).collect())
    }
}

/// Derived progress of one path
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Completed steps, or the rounded completion scalar for step-less paths
    pub completed: u32,
    /// Step count, or 100 for step-less paths
    pub total: u32,
    /// Percentage in [0, 100], two decimals
    pub percentage: f64,
}

/// Which paths an aggregate was computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregateScope {
    /// Only the selected paths
    Selected,
    /// The whole catalog (selection was empty)
    Catalog,
}

/// Aggregate progress across a set of paths
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateProgress {
    pub completed: usize,
    pub in_progress: usize,
    pub not_started: usize,
    /// Mean path percentage over the scope, two decimals
    pub overall_percentage: f64,
    pub scope: AggregateScope,
    /// Paths in the catalog
    pub total_paths: usize,
    /// Selected ids that exist in the catalog
    pub selected_count: usize,
}
