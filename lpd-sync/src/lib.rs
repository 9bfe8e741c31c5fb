//! # Learning Path Dashboard Sync Engine
//!
//! Keeps a local catalog of learning paths consistent with a remote
//! authority, tracks which paths a user selected and how far they got, and
//! derives progress statistics on demand.
//!
//! **Components (leaves first):**
//! - [`progress`]: memoized progress per path, invalidated by epoch
//! - [`selection`]: debounced, retrying selection persistence
//! - [`catalog`]: checksum-diffed catalog refresh
//! - [`listener`]: change notifications with reconnect backoff
//! - [`dashboard`]: startup, teardown and the view-layer surface
//!
//! Events go through the per-dashboard [`lpd_common::events::EventBus`].

pub mod catalog;
pub mod client;
pub mod dashboard;
pub mod error;
pub mod listener;
pub mod model;
pub mod progress;
pub mod retry;
pub mod scheduler;
pub mod selection;

pub use dashboard::{Dashboard, DashboardBuilder};
pub use error::{Result, SyncError};
pub use model::{
    AggregateProgress, AggregateScope, CatalogSnapshot, PathRecord, ProgressSnapshot,
    SelectionSet, Step,
};
pub use progress::numeric::format_percentage;
