//! Scripted collaborators

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use lpd_sync::catalog::CatalogSource;
use lpd_sync::listener::notifier::{ChannelEvent, ChannelStream, Notifier};
use lpd_sync::selection::backend::{SaveSelectionsRequest, SelectionBackend, StoredSelections};
use lpd_sync::{Result, SyncError};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Returns queued catalog responses in order, repeating the last one
#[derive(Default)]
pub struct ScriptedCatalogSource {
    queue: Mutex<VecDeque<Result<Value>>>,
    last: Mutex<Option<Result<Value>>>,
    fetches: AtomicUsize,
}

impl ScriptedCatalogSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(body: Value) -> Self {
        let source = Self::new();
        source.push_ok(body);
        source
    }

    pub fn push_ok(&self, body: Value) {
        self.queue.lock().unwrap().push_back(Ok(body));
    }

    pub fn push_err(&self, err: SyncError) {
        self.queue.lock().unwrap().push_back(Err(err));
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogSource for ScriptedCatalogSource {
    async fn fetch(&self) -> Result<Value> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let next = self.queue.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(response) => {
                *last = Some(response.clone());
                response
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err(SyncError::Network("no scripted response".to_string()))),
        }
    }
}

/// In-memory selection store
#[derive(Default)]
pub struct MemorySelectionBackend {
    stored: Mutex<StoredSelections>,
    saves: Mutex<Vec<SaveSelectionsRequest>>,
    attempts: AtomicUsize,
    failing_saves: AtomicU32,
    load_error: Mutex<Option<SyncError>>,
    load_gate: Mutex<Option<Arc<Notify>>>,
}

impl MemorySelectionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_selected(ids: &[&str]) -> Self {
        let backend = Self::new();
        backend.stored.lock().unwrap().selected_paths =
            ids.iter().map(|id| id.to_string()).collect();
        backend
    }

    /// Make the next `count` save attempts fail
    pub fn fail_next_saves(&self, count: u32) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    pub fn fail_load(&self, err: SyncError) {
        *self.load_error.lock().unwrap() = Some(err);
    }

    /// Hold every load until the returned gate is notified
    pub fn hold_loads(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.load_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Replace what the next load returns
    pub fn set_stored(&self, stored: StoredSelections) {
        *self.stored.lock().unwrap() = stored;
    }

    pub fn stored(&self) -> StoredSelections {
        self.stored.lock().unwrap().clone()
    }

    /// Successful writes, in order
    pub fn saves(&self) -> Vec<SaveSelectionsRequest> {
        self.saves.lock().unwrap().clone()
    }

    /// Every write attempt, failed ones included
    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SelectionBackend for MemorySelectionBackend {
    async fn load(&self, _user_id: &str) -> Result<StoredSelections> {
        let gate = self.load_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(err) = self.load_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.stored())
    }

    async fn save(&self, request: &SaveSelectionsRequest) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_saves.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_saves.store(failing - 1, Ordering::SeqCst);
            return Err(SyncError::Transport { status: 503 });
        }

        self.saves.lock().unwrap().push(request.clone());
        *self.stored.lock().unwrap() = StoredSelections {
            selected_paths: request.selected_paths.clone(),
            selection_count: Some(request.selected_paths.len()),
            integrity: request.integrity.clone(),
        };
        Ok(())
    }
}

/// Behaviour of one scripted connection
#[derive(Debug, Clone)]
pub enum ChannelScript {
    /// `connect` fails
    Refuse(String),
    /// Deliver the events, then end the stream
    Deliver(Vec<ChannelEvent>),
    /// Deliver the events, then stay open
    Hold(Vec<ChannelEvent>),
}

/// Plays one script per connection; refuses once the scripts run out
#[derive(Default)]
pub struct ScriptedNotifier {
    scripts: Mutex<VecDeque<ChannelScript>>,
    connects: AtomicUsize,
}

impl ScriptedNotifier {
    pub fn new(scripts: Vec<ChannelScript>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            connects: AtomicUsize::new(0),
        }
    }

    /// Notifier whose every connection is refused
    pub fn refusing() -> Self {
        Self::default()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for ScriptedNotifier {
    async fn connect(&self) -> Result<ChannelStream> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ChannelScript::Refuse("connection refused".to_string()));

        match script {
            ChannelScript::Refuse(reason) => Err(SyncError::Network(reason)),
            ChannelScript::Deliver(events) => Ok(Box::pin(stream::iter(events))),
            ChannelScript::Hold(events) => {
                Ok(Box::pin(stream::iter(events).chain(stream::pending())))
            }
        }
    }
}
