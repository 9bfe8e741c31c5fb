//! Selection store
//!
//! Holds the set of selected path ids. Local toggles apply to memory at
//! once and are written back after a quiet period, so a burst of toggles
//! produces a single write of the final state. Writes retry with
//! exponential backoff; changes made by other processes replace the local
//! set wholesale.

pub mod backend;
pub mod external;
pub mod integrity;

use async_trait::async_trait;
use lpd_common::config::{DashboardConfig, SelectionConfig};
use lpd_common::events::{DashboardEvent, EventBus, SelectionSource};
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::model::SelectionSet;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::scheduler::{ScheduledTask, Scheduler};
use backend::{SaveSelectionsRequest, SelectionBackend};
use external::ExternalChange;
use integrity::IntegrityEnvelope;

/// Selection operations used by the dashboard
#[async_trait]
pub trait SelectionStore: Send + Sync {
    /// Fetch prior selections and adopt them; failures propagate
    ///
    /// A response arriving after shutdown is dropped with `Cancelled`.
    async fn load(&self) -> Result<SelectionSet>;

    /// Select or deselect one path and schedule a debounced write
    ///
    /// After shutdown this does nothing and resolves `Ok(())` at once.
    fn toggle(&self, path_id: &str, selected: bool) -> PendingWrite;

    /// Write the current set now, with retries
    async fn persist(&self) -> Result<()>;

    /// Copy of the current set
    fn selection(&self) -> SelectionSet;

    /// Adopt a change made by another process; returns true if it applied
    fn apply_external_change(&self, change: &ExternalChange) -> bool;

    /// Cancel pending writes and clear the set
    fn shutdown(&self);
}

/// Debounce, retry and integrity settings of a [`RemoteSelectionStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionSettings {
    pub debounce: Duration,
    pub retry: RetryPolicy,
    pub integrity: bool,
}

impl SelectionSettings {
    pub fn from_config(config: &DashboardConfig) -> Self {
        let SelectionConfig {
            debounce_ms,
            retry_attempts,
            retry_base_delay_ms,
        } = config.selection;
        Self {
            debounce: Duration::from_millis(debounce_ms),
            retry: RetryPolicy {
                max_attempts: retry_attempts,
                base_delay: Duration::from_millis(retry_base_delay_ms),
            },
            integrity: config.integrity_mode,
        }
    }
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self::from_config(&DashboardConfig::default())
    }
}

/// Resolves once persistence of a toggle has been attempted
///
/// Every toggle of one debounce burst receives the outcome of the single
/// write that burst produced. Resolves to `Cancelled` when the store shuts
/// down before the write runs.
#[must_use = "dropping a PendingWrite does not cancel the write, but its outcome is lost"]
pub struct PendingWrite {
    rx: oneshot::Receiver<Result<()>>,
}

impl PendingWrite {
    /// Already-settled write carrying `result`
    pub(crate) fn resolved(result: Result<()>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }
}

impl Future for PendingWrite {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(SyncError::Cancelled(
                    "selection write abandoned".to_string(),
                ))
            })
        })
    }
}

#[derive(Default)]
struct StoreState {
    selection: SelectionSet,
    debounce: Option<ScheduledTask>,
    waiters: Vec<oneshot::Sender<Result<()>>>,
    shut_down: bool,
}

struct StoreInner {
    backend: Arc<dyn SelectionBackend>,
    bus: EventBus,
    scheduler: Scheduler,
    user_id: String,
    settings: SelectionSettings,
    state: Mutex<StoreState>,
    persist_lock: tokio::sync::Mutex<()>,
}

/// Selection store backed by a [`SelectionBackend`]
///
/// Cloning shares the same store.
#[derive(Clone)]
pub struct RemoteSelectionStore {
    inner: Arc<StoreInner>,
}

impl RemoteSelectionStore {
    /// # Arguments
    /// * `backend` - Remote store
    /// * `bus` - Event bus of the owning dashboard
    /// * `scheduler` - Scheduler for debounce and retry timers
    /// * `user_id` - User whose selections are loaded and written
    /// * `settings` - Debounce, retry and integrity settings
    pub fn new(
        backend: Arc<dyn SelectionBackend>,
        bus: EventBus,
        scheduler: Scheduler,
        user_id: impl Into<String>,
        settings: SelectionSettings,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                backend,
                bus,
                scheduler,
                user_id: user_id.into(),
                settings,
                state: Mutex::new(StoreState::default()),
                persist_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Number of toggles waiting for the next write
    pub fn pending_writes(&self) -> usize {
        self.inner.state().waiters.len()
    }
}

impl StoreInner {
    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn save_request(&self) -> SaveSelectionsRequest {
        let selection = self.state().selection.clone();
        SaveSelectionsRequest {
            selected_paths: selection.to_vec(),
            user_id: self.user_id.clone(),
            integrity: self
                .settings
                .integrity
                .then(|| IntegrityEnvelope::seal(&selection)),
        }
    }

    async fn persist(&self) -> Result<()> {
        let _serialized = self.persist_lock.lock().await;

        let result = retry_with_backoff("persist", self.settings.retry, &self.scheduler, || {
            let request = self.save_request();
            let backend = Arc::clone(&self.backend);
            async move { backend.save(&request).await }
        })
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(SyncError::Cancelled(reason)) => {
                debug!(reason = %reason, "Selection persist cancelled");
                Err(SyncError::Cancelled(reason))
            }
            Err(err) => {
                let message = err.to_string();
                self.bus.emit(DashboardEvent::StorageError {
                    operation: "persist".to_string(),
                    message: message.clone(),
                });
                Err(SyncError::Storage {
                    operation: "persist".to_string(),
                    message,
                })
            }
        }
    }

    /// Debounce expiry: write once and notify every waiting toggle
    async fn flush(&self) {
        let waiters = mem::take(&mut self.state().waiters);
        debug!(waiters = waiters.len(), "Debounce elapsed, persisting selections");

        let result = self.persist().await;
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

#[async_trait]
impl SelectionStore for RemoteSelectionStore {
    async fn load(&self) -> Result<SelectionSet> {
        let stored = self
            .inner
            .backend
            .load(&self.inner.user_id)
            .await
            .map_err(|e| SyncError::SelectionLoad(e.to_string()))?;

        let selection: SelectionSet = stored.selected_paths.into_iter().collect();
        if let Some(envelope) = &stored.integrity {
            envelope
                .verify(&selection)
                .map_err(|e| SyncError::SelectionLoad(e.to_string()))?;
        }

        {
            let mut state = self.inner.state();
            if state.shut_down {
                debug!("Discarding selection load completed after shutdown");
                return Err(SyncError::Cancelled(
                    "selection store shut down".to_string(),
                ));
            }
            state.selection = selection.clone();
        }
        info!(
            user_id = %self.inner.user_id,
            count = selection.len(),
            "Loaded selected paths"
        );
        Ok(selection)
    }

    fn toggle(&self, path_id: &str, selected: bool) -> PendingWrite {
        let (rx, changed) = {
            let mut state = self.inner.state();
            if state.shut_down {
                debug!(path_id, "Toggle after shutdown ignored");
                return PendingWrite::resolved(Ok(()));
            }

            let changed = if selected {
                state.selection.insert(path_id)
            } else {
                state.selection.remove(path_id)
            };

            if let Some(previous) = state.debounce.take() {
                previous.cancel();
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);

            let inner = Arc::clone(&self.inner);
            state.debounce = Some(
                self.inner
                    .scheduler
                    .schedule_after(self.inner.settings.debounce, async move {
                        inner.flush().await;
                    }),
            );
            (rx, changed)
        };

        debug!(path_id, selected, changed, "Selection toggled");
        if changed {
            let (added, removed) = if selected {
                (vec![path_id.to_string()], Vec::new())
            } else {
                (Vec::new(), vec![path_id.to_string()])
            };
            self.inner.bus.emit(DashboardEvent::SelectionChanged {
                added,
                removed,
                source: SelectionSource::Local,
            });
        }

        PendingWrite { rx }
    }

    async fn persist(&self) -> Result<()> {
        self.inner.persist().await
    }

    fn selection(&self) -> SelectionSet {
        self.inner.state().selection.clone()
    }

    fn apply_external_change(&self, change: &ExternalChange) -> bool {
        if !change.is_selection_change() {
            return false;
        }

        let next = match change.new_value.as_deref() {
            None => SelectionSet::new(),
            Some(raw) => match SelectionSet::from_serialized(raw) {
                Ok(next) => next,
                Err(e) => {
                    warn!(error = %e, "Ignoring malformed external selection change");
                    return false;
                }
            },
        };

        let (added, removed) = {
            let mut state = self.inner.state();
            if state.shut_down {
                return false;
            }
            let diff = state.selection.diff(&next);
            state.selection = next;
            diff
        };

        debug!(
            added = added.len(),
            removed = removed.len(),
            "External selection change applied"
        );
        if !added.is_empty() || !removed.is_empty() {
            self.inner.bus.emit(DashboardEvent::SelectionChanged {
                added,
                removed,
                source: SelectionSource::External,
            });
        }
        true
    }

    fn shutdown(&self) {
        let waiters = {
            let mut state = self.inner.state();
            state.shut_down = true;
            state.selection.clear();
            if let Some(task) = state.debounce.take() {
                task.cancel();
            }
            mem::take(&mut state.waiters)
        };

        for waiter in waiters {
            let _ = waiter.send(Err(SyncError::Cancelled(
                "selection store shut down".to_string(),
            )));
        }
    }
}
