//! Event capture for assertions

use lpd_common::events::{DashboardEvent, EventBus, EventKind};
use std::sync::{Arc, Mutex};

/// Records every event emitted on a bus, in order
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<DashboardEvent>>>,
}

impl EventRecorder {
    /// Register a handler for every event kind on `bus`
    pub fn attach(bus: &EventBus) -> Self {
        let recorder = Self::default();
        for kind in EventKind::ALL {
            let events = Arc::clone(&recorder.events);
            bus.on(kind, move |event| {
                events.lock().unwrap().push(event.clone());
            });
        }
        recorder
    }

    pub fn events(&self) -> Vec<DashboardEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Wire names of the recorded events
    pub fn types(&self) -> Vec<&'static str> {
        self.events().iter().map(DashboardEvent::event_type).collect()
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<DashboardEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.kind() == kind)
            .collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.of_kind(kind).len()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}
