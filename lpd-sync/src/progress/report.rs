//! Derived reports over the whole catalog

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::numeric::{normalize, parse_estimated_time_to_hours, round2};
use crate::model::{PathRecord, ProgressSnapshot};

/// Estimated learning hours split by completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeStatistics {
    pub total_estimated: f64,
    pub completed: f64,
    pub remaining: f64,
}

/// Progress breakdown of one category
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryProgress {
    pub completed: usize,
    pub in_progress: usize,
    pub not_started: usize,
    pub average_progress: f64,
}

/// Where a path stands, by percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStatus {
    Completed,
    InProgress,
    NotStarted,
}

impl PathStatus {
    pub fn of(percentage: f64) -> Self {
        if percentage >= 100.0 {
            PathStatus::Completed
        } else if percentage > 0.0 {
            PathStatus::InProgress
        } else {
            PathStatus::NotStarted
        }
    }
}

/// Sum estimated hours, crediting completed paths and prorating partial ones
pub fn time_statistics<'a, I, F>(paths: I, progress: F) -> TimeStatistics
where
    I: IntoIterator<Item = &'a PathRecord>,
    F: Fn(&PathRecord) -> ProgressSnapshot,
{
    let mut stats = TimeStatistics::default();
    for path in paths {
        let hours = path
            .estimated_time
            .as_deref()
            .map(parse_estimated_time_to_hours)
            .unwrap_or(0.0);
        let percentage = progress(path).percentage;

        stats.total_estimated += hours;
        match PathStatus::of(percentage) {
            PathStatus::Completed => stats.completed += hours,
            PathStatus::InProgress => stats.remaining += hours * (1.0 - percentage / 100.0),
            PathStatus::NotStarted => stats.remaining += hours,
        }
    }

    TimeStatistics {
        total_estimated: round2(stats.total_estimated),
        completed: round2(stats.completed),
        remaining: round2(stats.remaining),
    }
}

/// Per-category counts and average progress
pub fn category_report<'a, I, F>(paths: I, progress: F) -> BTreeMap<String, CategoryProgress>
where
    I: IntoIterator<Item = &'a PathRecord>,
    F: Fn(&PathRecord) -> ProgressSnapshot,
{
    let mut sums: BTreeMap<String, (CategoryProgress, f64, usize)> = BTreeMap::new();
    for path in paths {
        let percentage = progress(path).percentage;
        let (category, sum, count) = sums.entry(path.category.clone()).or_default();
        match PathStatus::of(percentage) {
            PathStatus::Completed => category.completed += 1,
            PathStatus::InProgress => category.in_progress += 1,
            PathStatus::NotStarted => category.not_started += 1,
        }
        *sum += percentage;
        *count += 1;
    }

    sums.into_iter()
        .map(|(name, (mut category, sum, count))| {
            category.average_progress = normalize(sum / count as f64);
            (name, category)
        })
        .collect()
}
