//! Test helpers for lpd-sync integration tests
//!
//! Provides scripted stand-ins for every remote collaborator:
//! - ScriptedCatalogSource: catalog payloads and failures in order
//! - MemorySelectionBackend: in-memory selection store with failure injection
//! - ScriptedNotifier: change channels that refuse, end or stay open
//! - EventRecorder: captures every event emitted on a bus

#![allow(dead_code)]

pub mod fakes;
pub mod recorder;

pub use fakes::{ChannelScript, MemorySelectionBackend, ScriptedCatalogSource, ScriptedNotifier};
pub use recorder::EventRecorder;

use lpd_common::config::DashboardConfig;
use serde_json::{json, Value};

/// Catalog payload with the given checksum and `(id, step count)` paths
pub fn catalog_body(checksum: &str, paths: &[(&str, usize)]) -> Value {
    let descriptors: Vec<Value> = paths
        .iter()
        .map(|(id, steps)| {
            let steps: Vec<Value> = (1..=*steps)
                .map(|n| {
                    json!({
                        "id": format!("{}-step-{}", id, n),
                        "title": format!("Step {}", n)
                    })
                })
                .collect();
            json!({
                "id": id,
                "title": format!("Path {}", id),
                "category": "Edge",
                "estimatedTime": "2h",
                "steps": steps
            })
        })
        .collect();

    json!({
        "descriptors": descriptors,
        "checksum": checksum,
        "generatedAt": "2026-05-01T08:00:00Z"
    })
}

/// Defaults with remote sync on and short timers
pub fn test_config() -> DashboardConfig {
    let mut config = DashboardConfig::default();
    config.user_id = "test-user".to_string();
    config
}

/// Let spawned tasks run without advancing paused time
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
