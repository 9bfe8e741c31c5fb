//! Memoized progress calculation
//!
//! [`EpochProgressCache`] caches one [`ProgressSnapshot`] per path, tagged
//! with the cache epoch current when it was computed. Invalidation bumps
//! the epoch, which makes every cached entry stale in O(1). The epoch read
//! and the recompute happen under the same lock, so a value computed before
//! an invalidation is never served after it.

pub mod ledger;
pub mod milestones;
pub mod numeric;
pub mod report;

use lpd_common::events::{DashboardEvent, EventBus};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::model::{
    AggregateProgress, AggregateScope, CatalogSnapshot, ProgressSnapshot, SelectionSet,
};
use ledger::CompletionLedger;
use milestones::MilestoneTracker;
use numeric::{normalize, ratio_percentage, round2};
use report::{CategoryProgress, PathStatus, TimeStatistics};

/// Progress queries and mutations used by the dashboard
///
/// Implementations must be safe to call from event handlers: no method may
/// hold an internal lock while emitting events.
pub trait ProgressCache: Send + Sync {
    /// Progress of one path; unknown ids yield an all-zero snapshot
    fn progress_for(&self, path_id: &str) -> ProgressSnapshot;

    /// Make every cached value stale
    fn invalidate_all(&self);

    /// Current cache epoch
    fn epoch(&self) -> u64;

    /// Catalog the cache computes against
    fn catalog(&self) -> Option<Arc<CatalogSnapshot>>;

    /// Adopt a new catalog snapshot: seed the ledger, then invalidate
    fn apply_catalog(&self, snapshot: Arc<CatalogSnapshot>);

    /// Record one step's completion and emit progress events
    fn set_step_completed(
        &self,
        path_id: &str,
        step_id: &str,
        completed: bool,
    ) -> Result<ProgressSnapshot>;

    /// Set a path's completion percentage and emit progress events
    ///
    /// `value` must be finite and within [0, 100]; it is never clamped.
    fn update_progress(&self, path_id: &str, value: f64) -> Result<ProgressSnapshot>;

    /// Drop catalog, ledger, cached values and milestone history
    fn clear(&self);

    /// Aggregate over the selected paths, or the whole catalog when none
    /// of the selected ids are in the catalog
    fn aggregate(&self, selection: &SelectionSet) -> AggregateProgress {
        let Some(catalog) = self.catalog() else {
            return AggregateProgress {
                completed: 0,
                in_progress: 0,
                not_started: 0,
                overall_percentage: 0.0,
                scope: if selection.is_empty() {
                    AggregateScope::Catalog
                } else {
                    AggregateScope::Selected
                },
                total_paths: 0,
                selected_count: 0,
            };
        };

        let selected: Vec<&str> = catalog
            .paths
            .iter()
            .filter(|path| selection.contains(&path.id))
            .map(|path| path.id.as_str())
            .collect();

        let (scope, ids): (AggregateScope, Vec<&str>) = if selected.is_empty() {
            (
                AggregateScope::Catalog,
                catalog.paths.iter().map(|path| path.id.as_str()).collect(),
            )
        } else {
            (AggregateScope::Selected, selected.clone())
        };

        let mut completed = 0;
        let mut in_progress = 0;
        let mut not_started = 0;
        let mut sum = 0.0;
        for id in &ids {
            let percentage = self.progress_for(id).percentage;
            match PathStatus::of(percentage) {
                PathStatus::Completed => completed += 1,
                PathStatus::InProgress => in_progress += 1,
                PathStatus::NotStarted => not_started += 1,
            }
            sum += percentage;
        }

        let overall_percentage = if ids.is_empty() {
            0.0
        } else {
            normalize(sum / ids.len() as f64)
        };

        AggregateProgress {
            completed,
            in_progress,
            not_started,
            overall_percentage,
            scope,
            total_paths: catalog.len(),
            selected_count: selected.len(),
        }
    }

    /// Estimated hours across the catalog
    fn time_statistics(&self) -> TimeStatistics {
        match self.catalog() {
            Some(catalog) => report::time_statistics(&catalog.paths, |path| {
                self.progress_for(&path.id)
            }),
            None => TimeStatistics::default(),
        }
    }

    /// Completion breakdown per category
    fn category_report(&self) -> BTreeMap<String, CategoryProgress> {
        match self.catalog() {
            Some(catalog) => report::category_report(&catalog.paths, |path| {
                self.progress_for(&path.id)
            }),
            None => BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    catalog: Option<Arc<CatalogSnapshot>>,
    ledger: CompletionLedger,
    entries: HashMap<String, (u64, ProgressSnapshot)>,
    epoch: u64,
    milestones: MilestoneTracker,
}

impl CacheState {
    fn lookup(&mut self, path_id: &str) -> ProgressSnapshot {
        if let Some((epoch, snapshot)) = self.entries.get(path_id) {
            if *epoch == self.epoch {
                return *snapshot;
            }
        }
        let snapshot = self.compute(path_id);
        self.entries.insert(path_id.to_string(), (self.epoch, snapshot));
        snapshot
    }

    fn compute(&self, path_id: &str) -> ProgressSnapshot {
        let path = self
            .catalog
            .as_ref()
            .and_then(|catalog| catalog.path(path_id));

        match path {
            Some(path) if !path.steps.is_empty() => {
                let total = u32::try_from(path.steps.len()).unwrap_or(u32::MAX);
                let completed = self.ledger.completed_steps(path);
                ProgressSnapshot {
                    completed,
                    total,
                    percentage: ratio_percentage(completed, total),
                }
            }
            Some(_) => self.scalar_snapshot(path_id),
            None if self.ledger.scalar(path_id).is_some() => self.scalar_snapshot(path_id),
            None => ProgressSnapshot::default(),
        }
    }

    fn scalar_snapshot(&self, path_id: &str) -> ProgressSnapshot {
        let percentage = normalize(self.ledger.scalar(path_id).unwrap_or(0.0));
        ProgressSnapshot {
            completed: percentage.round() as u32,
            total: 100,
            percentage,
        }
    }

    fn invalidate(&mut self) {
        self.epoch += 1;
    }
}

/// Progress cache keyed by `(path_id, epoch)`
pub struct EpochProgressCache {
    state: Mutex<CacheState>,
    bus: EventBus,
}

impl EpochProgressCache {
    /// # Arguments
    /// * `bus` - Event bus of the owning dashboard
    /// * `milestones` - Threshold percentages, e.g. `[25, 50, 75]`
    pub fn new(bus: EventBus, milestones: Vec<u32>) -> Self {
        Self {
            state: Mutex::new(CacheState {
                milestones: MilestoneTracker::new(milestones),
                ..CacheState::default()
            }),
            bus,
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build the events for a progress change, updating milestone history
    fn progress_events(
        state: &mut CacheState,
        path_id: &str,
        step_id: Option<&str>,
        before: ProgressSnapshot,
        after: ProgressSnapshot,
    ) -> Vec<DashboardEvent> {
        let mut events = vec![DashboardEvent::ProgressUpdated {
            path_id: path_id.to_string(),
            step_id: step_id.map(str::to_string),
            completed: after.completed,
            total: after.total,
            percentage: after.percentage,
        }];

        if let Some(milestone) = state.milestones.observe(path_id, after.percentage) {
            info!(path_id, milestone, "Milestone reached");
            events.push(DashboardEvent::MilestoneReached {
                path_id: path_id.to_string(),
                milestone,
            });
        }

        if after.percentage >= 100.0 && before.percentage < 100.0 {
            info!(path_id, "Path completed");
            events.push(DashboardEvent::PathCompleted {
                path_id: path_id.to_string(),
            });
        }

        events
    }

    fn emit_all(&self, events: Vec<DashboardEvent>) {
        for event in events {
            self.bus.emit(event);
        }
    }
}

impl ProgressCache for EpochProgressCache {
    fn progress_for(&self, path_id: &str) -> ProgressSnapshot {
        self.state().lookup(path_id)
    }

    fn invalidate_all(&self) {
        let mut state = self.state();
        state.invalidate();
        debug!(epoch = state.epoch, "Progress cache invalidated");
    }

    fn epoch(&self) -> u64 {
        self.state().epoch
    }

    fn catalog(&self) -> Option<Arc<CatalogSnapshot>> {
        self.state().catalog.clone()
    }

    fn apply_catalog(&self, snapshot: Arc<CatalogSnapshot>) {
        let mut state = self.state();
        let seeded = state.ledger.seed(&snapshot);
        state.catalog = Some(snapshot);
        state.invalidate();
        debug!(seeded, epoch = state.epoch, "Progress cache adopted catalog");
    }

    fn set_step_completed(
        &self,
        path_id: &str,
        step_id: &str,
        completed: bool,
    ) -> Result<ProgressSnapshot> {
        let (after, events) = {
            let mut state = self.state();
            let known_step = state
                .catalog
                .as_ref()
                .and_then(|catalog| catalog.path(path_id))
                .map(|path| path.steps.iter().any(|step| step.id == step_id));
            match known_step {
                None => {
                    return Err(SyncError::Validation(format!("Unknown path: {}", path_id)));
                }
                Some(false) => {
                    return Err(SyncError::Validation(format!(
                        "Unknown step {} in path {}",
                        step_id, path_id
                    )));
                }
                Some(true) => {}
            }

            let before = state.lookup(path_id);
            if !state.ledger.record(path_id, step_id, completed) {
                return Ok(before);
            }
            state.invalidate();
            let after = state.lookup(path_id);
            debug!(
                path_id,
                step_id,
                completed,
                percentage = after.percentage,
                "Step completion recorded"
            );
            let events = Self::progress_events(&mut state, path_id, Some(step_id), before, after);
            (after, events)
        };

        self.emit_all(events);
        Ok(after)
    }

    fn update_progress(&self, path_id: &str, value: f64) -> Result<ProgressSnapshot> {
        if !value.is_finite() {
            return Err(SyncError::Validation(
                "Progress value must be a number".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&value) {
            return Err(SyncError::Validation(format!(
                "Progress value must be between 0 and 100 (got {})",
                value
            )));
        }

        let (after, events) = {
            let mut state = self.state();
            let before = state.lookup(path_id);
            let value = round2(value);
            state.ledger.set_scalar(path_id, value);

            let step_ids: Vec<String> = state
                .catalog
                .as_ref()
                .and_then(|catalog| catalog.path(path_id))
                .map(|path| path.steps.iter().map(|step| step.id.clone()).collect())
                .unwrap_or_default();
            let to_complete = (value / 100.0 * step_ids.len() as f64).round() as usize;
            for (index, step_id) in step_ids.iter().enumerate() {
                state.ledger.record(path_id, step_id, index < to_complete);
            }

            state.invalidate();
            let after = state.lookup(path_id);
            debug!(path_id, value, percentage = after.percentage, "Path progress updated");
            let events = Self::progress_events(&mut state, path_id, None, before, after);
            (after, events)
        };

        self.emit_all(events);
        Ok(after)
    }

    fn clear(&self) {
        let mut state = self.state();
        state.catalog = None;
        state.ledger.clear();
        state.entries.clear();
        state.milestones.clear();
        state.invalidate();
    }
}
