//! Supporting types carried inside dashboard events

use serde::{Deserialize, Serialize};

/// Where a selection change originated
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionSource {
    /// User action in this instance
    Local,
    /// Another process changed the durable selection key
    External,
}

impl std::fmt::Display for SelectionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionSource::Local => write!(f, "local"),
            SelectionSource::External => write!(f, "external"),
        }
    }
}

/// Why the dashboard is showing an offline indicator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OfflineReason {
    /// A catalog refresh failed (transport or payload error)
    CatalogUnreachable,
    /// The change stream gave up after exhausting its reconnect attempts
    StreamExhausted,
}

impl std::fmt::Display for OfflineReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OfflineReason::CatalogUnreachable => write!(f, "catalog-unreachable"),
            OfflineReason::StreamExhausted => write!(f, "stream-exhausted"),
        }
    }
}

/// Event discriminant used as the subscription key on the bus
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    CatalogUpdated,
    CatalogError,
    Offline,
    SelectionChanged,
    ProgressUpdated,
    MilestoneReached,
    PathCompleted,
    StorageError,
    StreamConnected,
    StreamError,
    StreamReconnectScheduled,
    Destroyed,
}

impl EventKind {
    /// Every event kind, in declaration order
    pub const ALL: [EventKind; 12] = [
        EventKind::CatalogUpdated,
        EventKind::CatalogError,
        EventKind::Offline,
        EventKind::SelectionChanged,
        EventKind::ProgressUpdated,
        EventKind::MilestoneReached,
        EventKind::PathCompleted,
        EventKind::StorageError,
        EventKind::StreamConnected,
        EventKind::StreamError,
        EventKind::StreamReconnectScheduled,
        EventKind::Destroyed,
    ];

    /// Wire name of the event (matches the serde tag of `DashboardEvent`)
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CatalogUpdated => "catalog-updated",
            EventKind::CatalogError => "catalog-error",
            EventKind::Offline => "offline",
            EventKind::SelectionChanged => "selection-changed",
            EventKind::ProgressUpdated => "progress-updated",
            EventKind::MilestoneReached => "milestone-reached",
            EventKind::PathCompleted => "path-completed",
            EventKind::StorageError => "storage-error",
            EventKind::StreamConnected => "stream-connected",
            EventKind::StreamError => "stream-error",
            EventKind::StreamReconnectScheduled => "stream-reconnect-scheduled",
            EventKind::Destroyed => "destroyed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
