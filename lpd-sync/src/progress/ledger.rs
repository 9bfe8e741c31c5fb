//! The completion ledger: single source of step completion
//!
//! Catalog snapshots seed the ledger with their `completed` flags. A value
//! recorded locally (a user toggling a step, `update_progress`) is never
//! overwritten by a later snapshot; seeded values are.

use std::collections::HashMap;

use crate::model::{CatalogSnapshot, PathRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Seeded,
    Local,
}

#[derive(Debug, Clone, Copy)]
struct Entry<T> {
    value: T,
    origin: Origin,
}

#[derive(Debug, Clone, Default)]
pub struct CompletionLedger {
    steps: HashMap<String, HashMap<String, Entry<bool>>>,
    scalars: HashMap<String, Entry<f64>>,
}

impl CompletionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a snapshot; returns the number of step entries written
    pub fn seed(&mut self, snapshot: &CatalogSnapshot) -> usize {
        let mut written = 0;
        for path in &snapshot.paths {
            let steps = self.steps.entry(path.id.clone()).or_default();
            for step in &path.steps {
                match steps.get(&step.id) {
                    Some(entry) if entry.origin == Origin::Local => {}
                    _ => {
                        steps.insert(
                            step.id.clone(),
                            Entry {
                                value: step.completed,
                                origin: Origin::Seeded,
                            },
                        );
                        written += 1;
                    }
                }
            }

            match self.scalars.get(&path.id) {
                Some(entry) if entry.origin == Origin::Local => {}
                _ => {
                    self.scalars.insert(
                        path.id.clone(),
                        Entry {
                            value: path.completion,
                            origin: Origin::Seeded,
                        },
                    );
                }
            }
        }
        written
    }

    /// Record a local step completion; returns true if the value changed
    pub fn record(&mut self, path_id: &str, step_id: &str, completed: bool) -> bool {
        let previous = self.is_completed(path_id, step_id);
        self.steps.entry(path_id.to_string()).or_default().insert(
            step_id.to_string(),
            Entry {
                value: completed,
                origin: Origin::Local,
            },
        );
        previous != completed
    }

    pub fn is_completed(&self, path_id: &str, step_id: &str) -> bool {
        self.steps
            .get(path_id)
            .and_then(|steps| steps.get(step_id))
            .map(|entry| entry.value)
            .unwrap_or(false)
    }

    /// Steps of `path` the ledger holds as completed
    pub fn completed_steps(&self, path: &PathRecord) -> u32 {
        let count = path
            .steps
            .iter()
            .filter(|step| self.is_completed(&path.id, &step.id))
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Record a local path-level completion scalar
    pub fn set_scalar(&mut self, path_id: &str, value: f64) {
        self.scalars.insert(
            path_id.to_string(),
            Entry {
                value,
                origin: Origin::Local,
            },
        );
    }

    pub fn scalar(&self, path_id: &str) -> Option<f64> {
        self.scalars.get(path_id).map(|entry| entry.value)
    }

    pub fn clear(&mut self) {
        self.steps.clear();
        self.scalars.clear();
    }
}
