//! Cancellable delayed tasks
//!
//! Every timer in the engine (selection debounce, persistence retry delay,
//! listener reconnect backoff) goes through a [`Scheduler`]. Each dashboard
//! owns one root scheduler; components receive child schedulers so that
//! cancelling the root at teardown stops every pending timer at once.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, SyncError};

/// Tree of cancellable timers backed by a [`CancellationToken`]
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    token: CancellationToken,
}

impl Scheduler {
    /// Create a root scheduler
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Create a scheduler that is cancelled together with this one
    ///
    /// Cancelling the child leaves the parent running.
    pub fn child(&self) -> Scheduler {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Run `task` after `delay` unless cancelled first
    ///
    /// Cancellation only prevents a task that has not started yet. Once
    /// the delay elapses the body runs to completion; bodies that wait
    /// again should do so through [`Scheduler::sleep`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule_after<F>(&self, delay: Duration, task: F) -> ScheduledTask
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.child_token();
        let guard = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = guard.cancelled() => {
                    debug!(
                        delay_ms = delay.as_millis() as u64,
                        "Scheduled task cancelled before firing"
                    );
                }
                _ = tokio::time::sleep(delay) => {
                    task.await;
                }
            }
        });
        ScheduledTask { token, handle }
    }

    /// Wait for `delay`, returning `Cancelled` if the scheduler is cancelled first
    pub async fn sleep(&self, delay: Duration) -> Result<()> {
        tokio::select! {
            _ = self.token.cancelled() => {
                Err(SyncError::Cancelled("scheduler shut down".to_string()))
            }
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Cancel every pending task of this scheduler and its children
    pub fn cancel_all(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token observed by long-running loops (the listener)
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Handle to one task created by [`Scheduler::schedule_after`]
#[derive(Debug)]
pub struct ScheduledTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Prevent the task from firing if its delay has not elapsed
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
