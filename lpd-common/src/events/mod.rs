//! Event types for the dashboard event system
//!
//! Provides the shared event definitions and the `EventBus` used by every
//! component of one dashboard instance.

mod types;

pub use types::{EventKind, OfflineReason, SelectionSource};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, error};

/// Dashboard event types
///
/// Events are emitted through the `EventBus` of a single dashboard instance
/// and serialize with a kebab-case `type` tag for the view layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DashboardEvent {
    /// A catalog snapshot with a new checksum was applied
    ///
    /// Triggers:
    /// - View: re-render the path list
    /// - Progress: cache already invalidated before emission
    CatalogUpdated {
        /// Number of path records in the new snapshot
        count: usize,
        /// Checksum of the new snapshot
        checksum: String,
        /// When the remote authority generated the snapshot
        generated_at: Option<DateTime<Utc>>,
    },

    /// A catalog refresh failed
    CatalogError {
        /// Human-readable failure description
        message: String,
    },

    /// The dashboard should surface an offline indicator
    Offline {
        /// What caused the offline state
        reason: OfflineReason,
    },

    /// Selection membership changed
    ///
    /// Triggers:
    /// - View: update card selection state
    /// - View: recompute the aggregate summary
    SelectionChanged {
        /// Ids that joined the selection
        added: Vec<String>,
        /// Ids that left the selection
        removed: Vec<String>,
        /// Local user action or external process
        source: SelectionSource,
    },

    /// Progress of a path changed
    ProgressUpdated {
        /// Path whose progress changed
        path_id: String,
        /// Step toggled, if the change came from a single step
        step_id: Option<String>,
        /// Completed steps (or completion scalar for step-less paths)
        completed: u32,
        /// Total steps (100 for step-less paths)
        total: u32,
        /// Rounded percentage in [0, 100]
        percentage: f64,
    },

    /// A configured milestone threshold was reached
    MilestoneReached {
        /// Path that reached the milestone
        path_id: String,
        /// Threshold percentage (e.g. 25)
        milestone: u32,
    },

    /// A path transitioned into 100% completion
    PathCompleted {
        /// Path that completed
        path_id: String,
    },

    /// Selection persistence failed after all retries
    StorageError {
        /// Operation that failed (e.g. "persist")
        operation: String,
        /// Last error observed
        message: String,
    },

    /// The change-notification channel opened
    StreamConnected,

    /// The change-notification channel failed
    StreamError {
        /// Error description
        error: String,
    },

    /// A reconnect attempt was scheduled after a channel failure
    StreamReconnectScheduled {
        /// 1-based reconnect attempt number
        attempt: u32,
        /// Delay before the attempt
        delay_ms: u64,
    },

    /// The dashboard instance was torn down
    Destroyed,
}

impl DashboardEvent {
    /// Get the event discriminant used for subscriptions
    pub fn kind(&self) -> EventKind {
        match self {
            DashboardEvent::CatalogUpdated { .. } => EventKind::CatalogUpdated,
            DashboardEvent::CatalogError { .. } => EventKind::CatalogError,
            DashboardEvent::Offline { .. } => EventKind::Offline,
            DashboardEvent::SelectionChanged { .. } => EventKind::SelectionChanged,
            DashboardEvent::ProgressUpdated { .. } => EventKind::ProgressUpdated,
            DashboardEvent::MilestoneReached { .. } => EventKind::MilestoneReached,
            DashboardEvent::PathCompleted { .. } => EventKind::PathCompleted,
            DashboardEvent::StorageError { .. } => EventKind::StorageError,
            DashboardEvent::StreamConnected => EventKind::StreamConnected,
            DashboardEvent::StreamError { .. } => EventKind::StreamError,
            DashboardEvent::StreamReconnectScheduled { .. } => EventKind::StreamReconnectScheduled,
            DashboardEvent::Destroyed => EventKind::Destroyed,
        }
    }

    /// Get event type as string for filtering
    pub fn event_type(&self) -> &'static str {
        self.kind().as_str()
    }
}

/// Identifies a registered handler so it can be removed again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler = Arc<dyn Fn(&DashboardEvent) + Send + Sync>;

/// Event distribution for one dashboard instance
///
/// Two delivery paths:
/// - **Handlers** (`on`/`off`): invoked synchronously on `emit`, in
///   registration order. A panicking handler is logged and skipped.
/// - **Subscribers** (`subscribe`): tokio broadcast receivers for async
///   consumers. Lossy when nobody listens.
///
/// Cloning shares the same bus. There is no process-wide instance, so two
/// dashboards never see each other's events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DashboardEvent>,
    capacity: usize,
    handlers: Arc<Mutex<HashMap<EventKind, Vec<(HandlerId, Handler)>>>>,
    next_handler_id: Arc<AtomicU64>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events buffered per broadcast subscriber
    ///   before the slowest subscriber starts lagging
    ///
    /// # Examples
    ///
    /// ```
    /// use lpd_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            capacity,
            handlers: Arc::new(Mutex::new(HashMap::new())),
            next_handler_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a handler for one event kind
    ///
    /// # Examples
    ///
    /// ```
    /// use lpd_common::events::{DashboardEvent, EventBus, EventKind};
    ///
    /// let bus = EventBus::new(16);
    /// let id = bus.on(EventKind::Destroyed, |_event| {});
    /// bus.emit(DashboardEvent::Destroyed);
    /// assert_eq!(bus.off(EventKind::Destroyed, Some(id)), 1);
    /// ```
    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&DashboardEvent) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_handler_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove handlers for an event kind
    ///
    /// With `Some(id)` removes that handler only; with `None` removes every
    /// handler registered for `kind`. Returns the number removed.
    pub fn off(&self, kind: EventKind, handler: Option<HandlerId>) -> usize {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        match handler {
            Some(id) => {
                let Some(list) = handlers.get_mut(&kind) else {
                    return 0;
                };
                let before = list.len();
                list.retain(|(existing, _)| *existing != id);
                let removed = before - list.len();
                if list.is_empty() {
                    handlers.remove(&kind);
                }
                removed
            }
            None => handlers.remove(&kind).map(|list| list.len()).unwrap_or(0),
        }
    }

    /// Emit an event to handlers and broadcast subscribers
    ///
    /// Handlers run on the caller's thread without the registry lock held,
    /// so a handler may register or remove handlers itself. Returns the
    /// number of handlers that completed without panicking.
    pub fn emit(&self, event: DashboardEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<Handler> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map(|list| list.iter().map(|(_, handler)| Arc::clone(handler)).collect())
            .unwrap_or_default();

        let mut delivered = 0;
        for handler in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    error!(
                        event = kind.as_str(),
                        panic = %panic_message(payload.as_ref()),
                        "Error in event handler"
                    );
                }
            }
        }

        if self.tx.send(event).is_err() {
            debug!(event = kind.as_str(), "No broadcast subscribers for event");
        }
        delivered
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.tx.subscribe()
    }

    /// Number of handlers registered for an event kind
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Remove every registered handler
    pub fn clear_handlers(&self) {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Get the current number of active broadcast subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn milestone(path_id: &str, milestone: u32) -> DashboardEvent {
        DashboardEvent::MilestoneReached {
            path_id: path_id.to_string(),
            milestone,
        }
    }

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.handler_count(EventKind::CatalogUpdated), 0);
    }

    #[test]
    fn test_handlers_receive_only_their_kind() {
        let bus = EventBus::new(10);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        bus.on(EventKind::MilestoneReached, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(milestone("p1", 25));
        bus.emit(DashboardEvent::StreamConnected);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_handler_does_not_block_others() {
        let bus = EventBus::new(10);
        let hits = Arc::new(AtomicUsize::new(0));

        bus.on(EventKind::MilestoneReached, |_| panic!("handler failure"));
        let counter = Arc::clone(&hits);
        bus.on(EventKind::MilestoneReached, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let delivered = bus.emit(milestone("p1", 50));
        assert_eq!(delivered, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_with_handler_removes_only_that_handler() {
        let bus = EventBus::new(10);
        let first = bus.on(EventKind::Destroyed, |_| {});
        bus.on(EventKind::Destroyed, |_| {});

        assert_eq!(bus.off(EventKind::Destroyed, Some(first)), 1);
        assert_eq!(bus.handler_count(EventKind::Destroyed), 1);
        assert_eq!(bus.off(EventKind::Destroyed, Some(first)), 0);
    }

    #[test]
    fn test_off_without_handler_removes_all() {
        let bus = EventBus::new(10);
        bus.on(EventKind::Destroyed, |_| {});
        bus.on(EventKind::Destroyed, |_| {});
        bus.on(EventKind::StreamConnected, |_| {});

        assert_eq!(bus.off(EventKind::Destroyed, None), 2);
        assert_eq!(bus.handler_count(EventKind::Destroyed), 0);
        assert_eq!(bus.handler_count(EventKind::StreamConnected), 1);
    }

    #[test]
    fn test_handler_may_register_during_emit() {
        let bus = EventBus::new(10);
        let inner = bus.clone();
        bus.on(EventKind::StreamConnected, move |_| {
            inner.on(EventKind::Destroyed, |_| {});
        });

        bus.emit(DashboardEvent::StreamConnected);
        assert_eq!(bus.handler_count(EventKind::Destroyed), 1);
    }

    #[tokio::test]
    async fn test_broadcast_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit(milestone("p2", 75));

        let received = rx.recv().await.unwrap();
        assert_eq!(received, milestone("p2", 75));
    }

    #[test]
    fn test_clones_share_handlers_but_instances_do_not() {
        let bus = EventBus::new(10);
        let clone = bus.clone();
        let other = EventBus::new(10);

        clone.on(EventKind::Destroyed, |_| {});

        assert_eq!(bus.handler_count(EventKind::Destroyed), 1);
        assert_eq!(other.handler_count(EventKind::Destroyed), 0);
    }

    #[test]
    fn test_event_serializes_with_kebab_type_tag() {
        let event = DashboardEvent::CatalogUpdated {
            count: 3,
            checksum: "abc".to_string(),
            generated_at: None,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "catalog-updated");
        assert_eq!(value["count"], 3);
        assert_eq!(event.event_type(), "catalog-updated");
    }
}
