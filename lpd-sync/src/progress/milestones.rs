//! Milestone detection
//!
//! A milestone fires when a path's percentage lands on a configured
//! threshold (within 0.01). Each threshold fires once per ascent: dropping
//! below a reached threshold forgets it so it can fire again.

use std::collections::{BTreeSet, HashMap};

const LANDING_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Default)]
pub struct MilestoneTracker {
    thresholds: Vec<u32>,
    reached: HashMap<String, BTreeSet<u32>>,
}

impl MilestoneTracker {
    pub fn new(mut thresholds: Vec<u32>) -> Self {
        thresholds.sort_unstable();
        thresholds.dedup();
        Self {
            thresholds,
            reached: HashMap::new(),
        }
    }

    pub fn thresholds(&self) -> &[u32] {
        &self.thresholds
    }

    /// Record `percentage` for `path_id`, returning the milestone it fires
    pub fn observe(&mut self, path_id: &str, percentage: f64) -> Option<u32> {
        let reached = self.reached.entry(path_id.to_string()).or_default();
        reached.retain(|threshold| f64::from(*threshold) <= percentage);

        let milestone = self.thresholds.iter().copied().find(|threshold| {
            (percentage - f64::from(*threshold)).abs() < LANDING_TOLERANCE
                && !reached.contains(threshold)
        })?;

        reached.insert(milestone);
        Some(milestone)
    }

    pub fn clear(&mut self) {
        self.reached.clear();
    }
}
