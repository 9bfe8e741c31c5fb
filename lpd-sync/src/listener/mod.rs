//! Change-notification listener
//!
//! Keeps a channel to the catalog authority open and triggers a catalog
//! refresh whenever a change notice carries a checksum different from the
//! held one.
//!
//! **State machine:**
//! ```text
//! Disconnected -> Connecting -> Connected
//!                     ^             | error / stream end
//!                     |             v
//!                     +-------- Backoff --(attempts exhausted)--> Offline
//! ```
//! Opening the channel resets the attempt counter. Closing the listener
//! cancels a pending reconnect; no reconnect fires afterwards.

pub mod notifier;
pub mod sse;

use futures::StreamExt;
use lpd_common::config::ReconnectConfig;
use lpd_common::events::{DashboardEvent, EventBus, OfflineReason};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::catalog::CatalogSyncClient;
use crate::scheduler::Scheduler;
use notifier::{ChangeNotice, ChannelEvent, Notifier};

/// Listener lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListenerState {
    Disconnected,
    Connecting,
    Connected,
    Backoff,
    Offline,
    Closed,
}

/// Reconnect bookkeeping exposed to the view layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectState {
    /// Reconnects attempted since the last successful open
    pub attempts: u32,
    /// Delay the next reconnect would wait
    pub next_delay_ms: u64,
    pub max_attempts: u32,
}

/// Exponential reconnect backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_attempts: config.max_attempts,
        }
    }

    /// Delay before reconnect number `attempt` (1-based): `base * 2^(attempt-1)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}

struct Shared {
    state: ListenerState,
    attempts: u32,
}

struct ListenerInner {
    notifier: Arc<dyn Notifier>,
    catalog: Arc<CatalogSyncClient>,
    bus: EventBus,
    policy: ReconnectPolicy,
    scheduler: Scheduler,
    shared: Mutex<Shared>,
}

pub struct ChangeListener {
    inner: Arc<ListenerInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChangeListener {
    /// # Arguments
    /// * `notifier` - Channel factory
    /// * `catalog` - Client refreshed on change notices
    /// * `bus` - Event bus of the owning dashboard
    /// * `policy` - Reconnect backoff
    /// * `scheduler` - Scheduler whose cancellation closes the listener
    pub fn new(
        notifier: Arc<dyn Notifier>,
        catalog: Arc<CatalogSyncClient>,
        bus: EventBus,
        policy: ReconnectPolicy,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            inner: Arc::new(ListenerInner {
                notifier,
                catalog,
                bus,
                policy,
                scheduler,
                shared: Mutex::new(Shared {
                    state: ListenerState::Disconnected,
                    attempts: 0,
                }),
            }),
            task: Mutex::new(None),
        }
    }

    /// Start the connect loop; a second call while running is a no-op
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Change listener already running");
            return;
        }
        if self.inner.scheduler.is_cancelled() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(async move { inner.run().await }));
    }

    /// Close the channel and cancel any pending reconnect
    pub fn close(&self) {
        self.inner.scheduler.cancel_all();
        self.inner.shared().state = ListenerState::Closed;
        info!("Change listener closed");
    }

    pub fn state(&self) -> ListenerState {
        self.inner.shared().state
    }

    pub fn reconnect_state(&self) -> ReconnectState {
        let attempts = self.inner.shared().attempts;
        let policy = self.inner.policy;
        ReconnectState {
            attempts,
            next_delay_ms: policy.delay_for(attempts + 1).as_millis() as u64,
            max_attempts: policy.max_attempts,
        }
    }
}

impl Drop for ChangeListener {
    fn drop(&mut self) {
        self.inner.scheduler.cancel_all();
    }
}

impl ListenerInner {
    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ListenerState) {
        let mut shared = self.shared();
        if shared.state != ListenerState::Closed {
            shared.state = state;
        }
    }

    async fn run(&self) {
        let token = self.scheduler.token();

        loop {
            self.set_state(ListenerState::Connecting);

            let connected = tokio::select! {
                _ = token.cancelled() => break,
                connected = self.notifier.connect() => connected,
            };

            let error = match connected {
                Err(err) => err.to_string(),
                Ok(mut channel) => loop {
                    let next = tokio::select! {
                        _ = token.cancelled() => None,
                        next = channel.next() => Some(next),
                    };
                    match next {
                        None => return,
                        Some(Some(ChannelEvent::Open)) => self.on_open(),
                        Some(Some(ChannelEvent::CatalogChanged(notice))) => {
                            tokio::select! {
                                _ = token.cancelled() => return,
                                _ = self.on_change(notice) => {}
                            }
                        }
                        Some(Some(ChannelEvent::Error(error))) => break error,
                        Some(None) => break "change stream ended".to_string(),
                    }
                },
            };

            if !self.on_error(error) {
                return;
            }
            if self.scheduler.sleep(self.current_delay()).await.is_err() {
                return;
            }
        }
    }

    fn on_open(&self) {
        {
            let mut shared = self.shared();
            shared.attempts = 0;
            if shared.state != ListenerState::Closed {
                shared.state = ListenerState::Connected;
            }
        }
        info!("Change stream connected");
        self.bus.emit(DashboardEvent::StreamConnected);
    }

    async fn on_change(&self, notice: ChangeNotice) {
        let Some(checksum) = notice.checksum else {
            debug!("Change notice without checksum ignored");
            return;
        };
        if self.catalog.current_checksum().as_deref() == Some(checksum.as_str()) {
            debug!(checksum = %checksum, "Change notice matches held catalog");
            return;
        }

        debug!(
            checksum = %checksum,
            descriptor_count = ?notice.descriptor_count,
            "Catalog changed remotely, refreshing"
        );
        if let Err(err) = self.catalog.refresh().await {
            debug!(error = %err, "Refresh triggered by change notice failed");
        }
    }

    /// Record a channel failure; returns false when the listener gives up
    fn on_error(&self, error: String) -> bool {
        if self.shared().state == ListenerState::Closed {
            debug!(error = %error, "Change stream error after close ignored");
            return false;
        }
        warn!(error = %error, "Change stream error");
        self.bus.emit(DashboardEvent::StreamError {
            error: error.clone(),
        });

        let scheduled = {
            let mut shared = self.shared();
            if shared.state == ListenerState::Closed {
                return false;
            }
            if shared.attempts >= self.policy.max_attempts {
                shared.state = ListenerState::Offline;
                None
            } else {
                shared.attempts += 1;
                shared.state = ListenerState::Backoff;
                Some(shared.attempts)
            }
        };

        match scheduled {
            Some(attempt) => {
                let delay_ms = self.policy.delay_for(attempt).as_millis() as u64;
                debug!(attempt, delay_ms, "Change stream reconnect scheduled");
                self.bus.emit(DashboardEvent::StreamReconnectScheduled { attempt, delay_ms });
                true
            }
            None => {
                warn!(
                    max_attempts = self.policy.max_attempts,
                    "Change stream reconnection failed, going offline"
                );
                self.bus.emit(DashboardEvent::Offline {
                    reason: OfflineReason::StreamExhausted,
                });
                false
            }
        }
    }

    fn current_delay(&self) -> Duration {
        self.policy.delay_for(self.shared().attempts)
    }
}
