//! Catalog synchronization
//!
//! [`CatalogSyncClient`] pulls the catalog from a [`CatalogSource`] and
//! replaces the held snapshot only when the checksum changes. Refreshes are
//! serialized by a lock held from fetch to event emission, so
//! `catalog-updated` events always follow fetch order.

pub mod manifest;
pub mod source;

use lpd_common::events::{DashboardEvent, EventBus, OfflineReason};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::model::{CatalogSnapshot, PathRecord};
use crate::progress::ProgressCache;
pub use source::{CatalogSource, HttpCatalogSource};

/// Result of one refresh
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// A snapshot with a new checksum was applied
    Updated(Arc<CatalogSnapshot>),
    /// The remote checksum matched the held snapshot
    Unchanged(Arc<CatalogSnapshot>),
    /// The response arrived after the client was closed
    Discarded,
}

/// Reachability of the catalog authority as of the last refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Unknown,
    Connected,
    Disconnected,
}

struct ClientState {
    snapshot: Option<Arc<CatalogSnapshot>>,
    connectivity: Connectivity,
}

pub struct CatalogSyncClient {
    source: Arc<dyn CatalogSource>,
    progress: Arc<dyn ProgressCache>,
    bus: EventBus,
    refresh_lock: tokio::sync::Mutex<()>,
    state: Mutex<ClientState>,
    closed: AtomicBool,
}

impl CatalogSyncClient {
    /// # Arguments
    /// * `source` - Catalog payload source
    /// * `progress` - Cache seeded and invalidated on every applied snapshot
    /// * `bus` - Event bus of the owning dashboard
    pub fn new(
        source: Arc<dyn CatalogSource>,
        progress: Arc<dyn ProgressCache>,
        bus: EventBus,
    ) -> Self {
        Self {
            source,
            progress,
            bus,
            refresh_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(ClientState {
                snapshot: None,
                connectivity: Connectivity::Unknown,
            }),
            closed: AtomicBool::new(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch the catalog and apply it if its checksum changed
    ///
    /// Failures mark the client disconnected and emit `catalog-error` and
    /// `offline` before being returned. There is no automatic retry.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let _serialized = self.refresh_lock.lock().await;
        if self.is_closed() {
            return Ok(RefreshOutcome::Discarded);
        }

        let fetched = self.source.fetch().await.and_then(manifest::parse);

        if self.is_closed() {
            debug!("Discarding catalog response received after close");
            return Ok(RefreshOutcome::Discarded);
        }

        let snapshot = match fetched {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.state().connectivity = Connectivity::Disconnected;
                warn!(error = %err, "Catalog refresh failed");
                self.bus.emit(DashboardEvent::CatalogError {
                    message: err.to_string(),
                });
                self.bus.emit(DashboardEvent::Offline {
                    reason: OfflineReason::CatalogUnreachable,
                });
                return Err(err);
            }
        };

        let current = {
            let mut state = self.state();
            state.connectivity = Connectivity::Connected;
            state
                .snapshot
                .as_ref()
                .filter(|held| held.checksum == snapshot.checksum)
                .cloned()
        };
        if let Some(current) = current {
            debug!(checksum = %current.checksum, "Catalog unchanged");
            return Ok(RefreshOutcome::Unchanged(current));
        }

        Ok(RefreshOutcome::Updated(self.install(snapshot)))
    }

    /// Install externally supplied paths when no snapshot is held yet
    ///
    /// Returns false (and changes nothing) once any snapshot exists.
    pub fn apply_local(&self, paths: Vec<PathRecord>) -> bool {
        if self.is_closed() || self.state().snapshot.is_some() {
            return false;
        }
        let paths = manifest::sanitize(paths);
        let checksum = manifest::derive_checksum(&paths);
        self.install(CatalogSnapshot {
            paths,
            checksum,
            generated_at: None,
        });
        true
    }

    fn install(&self, snapshot: CatalogSnapshot) -> Arc<CatalogSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.state().snapshot = Some(Arc::clone(&snapshot));
        self.progress.apply_catalog(Arc::clone(&snapshot));

        info!(
            checksum = %snapshot.checksum,
            count = snapshot.len(),
            "Catalog updated"
        );
        self.bus.emit(DashboardEvent::CatalogUpdated {
            count: snapshot.len(),
            checksum: snapshot.checksum.clone(),
            generated_at: snapshot.generated_at,
        });
        snapshot
    }

    /// Currently held snapshot
    pub fn snapshot(&self) -> Option<Arc<CatalogSnapshot>> {
        self.state().snapshot.clone()
    }

    pub fn current_checksum(&self) -> Option<String> {
        self.state()
            .snapshot
            .as_ref()
            .map(|snapshot| snapshot.checksum.clone())
    }

    pub fn connectivity(&self) -> Connectivity {
        self.state().connectivity
    }

    /// Discard in-flight and future refresh results and drop the snapshot
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.state().snapshot = None;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
