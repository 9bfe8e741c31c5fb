//! Dashboard orchestrator
//!
//! Wires one event bus, scheduler, progress cache, selection store,
//! catalog client and change listener together and exposes the query and
//! mutation surface the view layer uses.
//!
//! **Startup order:**
//! 1. Load selections (failure aborts startup)
//! 2. Initial catalog refresh (failure degrades to offline)
//! 3. Open the change listener (only with remote sync enabled)
//! 4. Install externally supplied initial paths, if no catalog arrived

use lpd_common::config::DashboardConfig;
use lpd_common::events::{DashboardEvent, EventBus, EventKind, HandlerId};
use std::collections::BTreeMap;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::catalog::{
    CatalogSource, CatalogSyncClient, Connectivity, HttpCatalogSource, RefreshOutcome,
};
use crate::client;
use crate::error::{Result, SyncError};
use crate::listener::notifier::Notifier;
use crate::listener::sse::SseNotifier;
use crate::listener::{ChangeListener, ListenerState, ReconnectPolicy, ReconnectState};
use crate::model::{
    AggregateProgress, CatalogSnapshot, PathRecord, ProgressSnapshot, SelectionSet,
};
use crate::progress::report::{CategoryProgress, TimeStatistics};
use crate::progress::{EpochProgressCache, ProgressCache};
use crate::scheduler::Scheduler;
use crate::selection::backend::{HttpSelectionBackend, SelectionBackend};
use crate::selection::external::ExternalChange;
use crate::selection::{PendingWrite, RemoteSelectionStore, SelectionSettings, SelectionStore};

/// Assembles a [`Dashboard`] from injected capabilities
///
/// Catalog source and selection backend are required. Progress cache and
/// selection store default to [`EpochProgressCache`] and
/// [`RemoteSelectionStore`]; the listener is only created when a notifier
/// is supplied.
pub struct DashboardBuilder {
    config: DashboardConfig,
    bus: EventBus,
    scheduler: Scheduler,
    catalog_source: Option<Arc<dyn CatalogSource>>,
    selection_backend: Option<Arc<dyn SelectionBackend>>,
    selection_store: Option<Arc<dyn SelectionStore>>,
    progress_cache: Option<Arc<dyn ProgressCache>>,
    notifier: Option<Arc<dyn Notifier>>,
    initial_paths: Vec<PathRecord>,
}

impl DashboardBuilder {
    pub fn new(config: DashboardConfig) -> Self {
        let bus = EventBus::new(config.event_bus_capacity);
        Self {
            config,
            bus,
            scheduler: Scheduler::new(),
            catalog_source: None,
            selection_backend: None,
            selection_store: None,
            progress_cache: None,
            notifier: None,
            initial_paths: Vec::new(),
        }
    }

    /// Bus the dashboard will use; custom components should emit on it
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Root scheduler the dashboard will cancel at teardown
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn catalog_source(mut self, source: Arc<dyn CatalogSource>) -> Self {
        self.catalog_source = Some(source);
        self
    }

    pub fn selection_backend(mut self, backend: Arc<dyn SelectionBackend>) -> Self {
        self.selection_backend = Some(backend);
        self
    }

    /// Replace the default selection store; the backend is then unused
    pub fn selection_store(mut self, store: Arc<dyn SelectionStore>) -> Self {
        self.selection_store = Some(store);
        self
    }

    pub fn progress_cache(mut self, cache: Arc<dyn ProgressCache>) -> Self {
        self.progress_cache = Some(cache);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Paths installed after startup when no remote catalog was obtained
    pub fn initial_paths(mut self, paths: Vec<PathRecord>) -> Self {
        self.initial_paths = paths;
        self
    }

    pub fn build(self) -> Result<Dashboard> {
        let source = self
            .catalog_source
            .ok_or_else(|| SyncError::Config("catalog source not configured".to_string()))?;

        let progress: Arc<dyn ProgressCache> = match self.progress_cache {
            Some(cache) => cache,
            None => Arc::new(EpochProgressCache::new(
                self.bus.clone(),
                self.config.progress.milestones.clone(),
            )),
        };

        let selection: Arc<dyn SelectionStore> = match (
            self.selection_store,
            self.selection_backend,
        ) {
            (Some(store), _) => store,
            (None, Some(backend)) => Arc::new(RemoteSelectionStore::new(
                backend,
                self.bus.clone(),
                self.scheduler.child(),
                self.config.user_id.clone(),
                SelectionSettings::from_config(&self.config),
            )),
            (None, None) => {
                return Err(SyncError::Config(
                    "selection backend not configured".to_string(),
                ))
            }
        };

        let catalog = Arc::new(CatalogSyncClient::new(
            source,
            Arc::clone(&progress),
            self.bus.clone(),
        ));

        let listener = self.notifier.map(|notifier| {
            ChangeListener::new(
                notifier,
                Arc::clone(&catalog),
                self.bus.clone(),
                ReconnectPolicy::from_config(&self.config.reconnect),
                self.scheduler.child(),
            )
        });

        Ok(Dashboard {
            bus: self.bus,
            scheduler: self.scheduler,
            progress,
            selection,
            catalog,
            listener,
            remote_sync: self.config.remote_sync,
            initial_paths: Mutex::new(self.initial_paths),
            started: AtomicBool::new(false),
            inert: AtomicBool::new(false),
        })
    }
}

/// One dashboard instance
pub struct Dashboard {
    bus: EventBus,
    scheduler: Scheduler,
    progress: Arc<dyn ProgressCache>,
    selection: Arc<dyn SelectionStore>,
    catalog: Arc<CatalogSyncClient>,
    listener: Option<ChangeListener>,
    remote_sync: bool,
    initial_paths: Mutex<Vec<PathRecord>>,
    started: AtomicBool,
    inert: AtomicBool,
}

impl Dashboard {
    pub fn builder(config: DashboardConfig) -> DashboardBuilder {
        DashboardBuilder::new(config)
    }

    /// Dashboard talking to the learning API described by `config`
    pub fn from_config(config: DashboardConfig) -> Result<Self> {
        config.validate()?;

        let http = client::http_client(Duration::from_secs(config.request_timeout_secs))?;
        let stream = client::stream_client(Duration::from_secs(config.request_timeout_secs))?;

        let source = Arc::new(HttpCatalogSource::new(http.clone(), config.catalog_url()));
        let backend = Arc::new(HttpSelectionBackend::new(http, config.selections_url()));
        let notifier = Arc::new(SseNotifier::new(stream, config.events_url()));

        Self::builder(config)
            .catalog_source(source)
            .selection_backend(backend)
            .notifier(notifier)
            .build()
    }

    /// Run the startup sequence
    ///
    /// Only a selection load failure is returned; catalog failures leave the
    /// dashboard running offline. Calling again, or after teardown, does
    /// nothing. A teardown while startup is in flight ends it quietly.
    pub async fn start(&self) -> Result<()> {
        if self.is_torn_down() || self.started.swap(true, Ordering::SeqCst) {
            debug!("Dashboard start ignored");
            return Ok(());
        }
        info!("Dashboard starting");

        let selection = match self.selection.load().await {
            Ok(selection) => selection,
            Err(SyncError::Cancelled(_)) if self.is_torn_down() => {
                debug!("Dashboard torn down during startup");
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        if self.is_torn_down() {
            debug!("Dashboard torn down during startup");
            return Ok(());
        }
        debug!(count = selection.len(), "Selections restored");

        match self.catalog.refresh().await {
            Ok(RefreshOutcome::Updated(snapshot)) => {
                debug!(count = snapshot.len(), "Initial catalog applied");
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "Initial catalog refresh failed, continuing offline");
            }
        }

        if self.remote_sync {
            if let Some(listener) = &self.listener {
                listener.start();
            }
        }

        let initial = mem::take(
            &mut *self
                .initial_paths
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if !initial.is_empty() && self.catalog.apply_local(initial) {
            info!("Installed local initial catalog");
        }

        info!("Dashboard started");
        Ok(())
    }

    /// Stop all activity and release state
    ///
    /// Emits `destroyed` and then drops every handler. Later calls are
    /// no-ops.
    pub fn teardown(&self) {
        if self.inert.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(listener) = &self.listener {
            listener.close();
        }
        self.scheduler.cancel_all();
        self.catalog.close();
        self.selection.shutdown();
        self.progress.clear();

        self.bus.emit(DashboardEvent::Destroyed);
        self.bus.clear_handlers();
        info!("Dashboard torn down");
    }

    pub fn is_torn_down(&self) -> bool {
        self.inert.load(Ordering::SeqCst)
    }

    pub fn catalog(&self) -> Option<Arc<CatalogSnapshot>> {
        self.catalog.snapshot()
    }

    pub fn selection(&self) -> SelectionSet {
        self.selection.selection()
    }

    pub fn progress_for(&self, path_id: &str) -> ProgressSnapshot {
        self.progress.progress_for(path_id)
    }

    /// Aggregate over the current selection (whole catalog when empty)
    pub fn aggregate(&self) -> AggregateProgress {
        self.progress.aggregate(&self.selection.selection())
    }

    pub fn time_statistics(&self) -> TimeStatistics {
        self.progress.time_statistics()
    }

    pub fn category_report(&self) -> BTreeMap<String, CategoryProgress> {
        self.progress.category_report()
    }

    /// Select or deselect a path; the returned future reports the write
    ///
    /// After teardown nothing changes and the future resolves `Ok(())`.
    pub fn toggle_selection(&self, path_id: &str, selected: bool) -> PendingWrite {
        if self.is_torn_down() {
            return PendingWrite::resolved(Ok(()));
        }
        self.selection.toggle(path_id, selected)
    }

    /// After teardown returns an all-zero snapshot and changes nothing
    pub fn set_step_completed(
        &self,
        path_id: &str,
        step_id: &str,
        completed: bool,
    ) -> Result<ProgressSnapshot> {
        if self.is_torn_down() {
            return Ok(ProgressSnapshot::default());
        }
        self.progress.set_step_completed(path_id, step_id, completed)
    }

    /// After teardown returns an all-zero snapshot and changes nothing
    pub fn update_progress(&self, path_id: &str, value: f64) -> Result<ProgressSnapshot> {
        if self.is_torn_down() {
            return Ok(ProgressSnapshot::default());
        }
        self.progress.update_progress(path_id, value)
    }

    /// Refresh the catalog now; true when a new snapshot was applied
    pub async fn refresh_catalog(&self) -> bool {
        if self.is_torn_down() {
            return false;
        }
        matches!(self.catalog.refresh().await, Ok(RefreshOutcome::Updated(_)))
    }

    /// Apply one cross-process selection change
    pub fn apply_external_change(&self, change: &ExternalChange) -> bool {
        !self.is_torn_down() && self.selection.apply_external_change(change)
    }

    /// Feed cross-process changes from `changes` until teardown
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach_external_feed(
        &self,
        mut changes: broadcast::Receiver<ExternalChange>,
    ) -> JoinHandle<()> {
        let selection = Arc::clone(&self.selection);
        let token = self.scheduler.token();
        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = token.cancelled() => break,
                    received = changes.recv() => received,
                };
                match received {
                    Ok(change) => {
                        selection.apply_external_change(&change);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "External change feed lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("External change feed detached");
        })
    }

    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&DashboardEvent) + Send + Sync + 'static,
    {
        self.bus.on(kind, handler)
    }

    pub fn off(&self, kind: EventKind, handler: Option<HandlerId>) -> usize {
        self.bus.off(kind, handler)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.bus.subscribe()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn connectivity(&self) -> Connectivity {
        self.catalog.connectivity()
    }

    /// Catalog reachable and, with remote sync, the listener not offline
    pub fn is_online(&self) -> bool {
        let listener_offline = self
            .listener
            .as_ref()
            .is_some_and(|listener| listener.state() == ListenerState::Offline);
        !self.is_torn_down() && self.connectivity() == Connectivity::Connected && !listener_offline
    }

    pub fn listener_state(&self) -> Option<ListenerState> {
        self.listener.as_ref().map(ChangeListener::state)
    }

    pub fn reconnect_state(&self) -> Option<ReconnectState> {
        self.listener.as_ref().map(ChangeListener::reconnect_state)
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.scheduler.cancel_all();
    }
}
