//! Change listener tests
//!
//! Runs on paused tokio time, so the full reconnect schedule completes
//! instantly. Covers:
//! - Backoff schedule 1s, 2s, 4s, 8s, 16s then offline
//! - Attempt reset on a successful open
//! - Change notices triggering (or skipping) a catalog refresh
//! - Close cancelling a pending reconnect

mod helpers;

use helpers::{catalog_body, ChannelScript, EventRecorder, ScriptedCatalogSource, ScriptedNotifier};
use lpd_common::events::{DashboardEvent, EventBus, EventKind, OfflineReason};
use lpd_sync::catalog::CatalogSyncClient;
use lpd_sync::listener::notifier::{ChangeNotice, ChannelEvent};
use lpd_sync::listener::{ChangeListener, ListenerState, ReconnectPolicy};
use lpd_sync::progress::EpochProgressCache;
use lpd_sync::scheduler::Scheduler;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

struct Fixture {
    source: Arc<ScriptedCatalogSource>,
    notifier: Arc<ScriptedNotifier>,
    catalog: Arc<CatalogSyncClient>,
    listener: ChangeListener,
    recorder: EventRecorder,
}

fn fixture(source: ScriptedCatalogSource, notifier: ScriptedNotifier) -> Fixture {
    let bus = EventBus::new(64);
    let recorder = EventRecorder::attach(&bus);
    let source = Arc::new(source);
    let notifier = Arc::new(notifier);
    let progress = Arc::new(EpochProgressCache::new(bus.clone(), vec![25, 50, 75]));
    let catalog = Arc::new(CatalogSyncClient::new(source.clone(), progress, bus.clone()));
    let listener = ChangeListener::new(
        notifier.clone(),
        Arc::clone(&catalog),
        bus,
        ReconnectPolicy::default(),
        Scheduler::new(),
    );
    Fixture {
        source,
        notifier,
        catalog,
        listener,
        recorder,
    }
}

fn changed(checksum: Option<&str>) -> ChannelEvent {
    ChannelEvent::CatalogChanged(ChangeNotice {
        checksum: checksum.map(str::to_string),
        descriptor_count: Some(1),
        version: None,
    })
}

fn reconnects(recorder: &EventRecorder) -> Vec<(u32, u64)> {
    recorder
        .of_kind(EventKind::StreamReconnectScheduled)
        .into_iter()
        .filter_map(|event| match event {
            DashboardEvent::StreamReconnectScheduled { attempt, delay_ms } => {
                Some((attempt, delay_ms))
            }
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_schedule_ends_offline() {
    let f = fixture(ScriptedCatalogSource::new(), ScriptedNotifier::refusing());
    let started = Instant::now();

    f.listener.start();
    sleep(Duration::from_secs(60)).await;

    assert_eq!(
        reconnects(&f.recorder),
        vec![(1, 1000), (2, 2000), (3, 4000), (4, 8000), (5, 16000)]
    );
    assert_eq!(f.notifier.connect_count(), 6);
    assert_eq!(f.recorder.count(EventKind::StreamError), 6);
    assert_eq!(
        f.recorder.of_kind(EventKind::Offline),
        vec![DashboardEvent::Offline {
            reason: OfflineReason::StreamExhausted
        }]
    );
    assert_eq!(f.listener.state(), ListenerState::Offline);
    assert!(started.elapsed() >= Duration::from_millis(31_000));
}

#[tokio::test(start_paused = true)]
async fn test_offline_listener_stays_quiet() {
    let f = fixture(ScriptedCatalogSource::new(), ScriptedNotifier::refusing());

    f.listener.start();
    sleep(Duration::from_secs(60)).await;
    let events = f.recorder.events().len();
    sleep(Duration::from_secs(600)).await;

    assert_eq!(f.recorder.events().len(), events);
    assert_eq!(f.notifier.connect_count(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_successful_open_resets_attempts() {
    let notifier = ScriptedNotifier::new(vec![
        ChannelScript::Deliver(vec![ChannelEvent::Open, ChannelEvent::Error("boom".to_string())]),
        ChannelScript::Deliver(vec![ChannelEvent::Open, ChannelEvent::Error("boom".to_string())]),
        ChannelScript::Hold(vec![ChannelEvent::Open]),
    ]);
    let f = fixture(ScriptedCatalogSource::new(), notifier);

    f.listener.start();
    sleep(Duration::from_secs(10)).await;

    assert_eq!(reconnects(&f.recorder), vec![(1, 1000), (1, 1000)]);
    assert_eq!(f.recorder.count(EventKind::StreamConnected), 3);
    assert_eq!(f.listener.state(), ListenerState::Connected);

    let state = f.listener.reconnect_state();
    assert_eq!(state.attempts, 0);
    assert_eq!(state.next_delay_ms, 1000);
    assert_eq!(state.max_attempts, 5);
}

#[tokio::test(start_paused = true)]
async fn test_stream_end_counts_as_error() {
    let notifier = ScriptedNotifier::new(vec![
        ChannelScript::Deliver(vec![ChannelEvent::Open]),
        ChannelScript::Hold(vec![ChannelEvent::Open]),
    ]);
    let f = fixture(ScriptedCatalogSource::new(), notifier);

    f.listener.start();
    sleep(Duration::from_secs(5)).await;

    assert_eq!(
        f.recorder.of_kind(EventKind::StreamError),
        vec![DashboardEvent::StreamError {
            error: "change stream ended".to_string()
        }]
    );
    assert_eq!(f.notifier.connect_count(), 2);
    assert_eq!(f.listener.state(), ListenerState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_change_notice_with_new_checksum_refreshes() {
    let source = ScriptedCatalogSource::new();
    source.push_ok(catalog_body("v1", &[("rust", 2)]));
    source.push_ok(catalog_body("v2", &[("rust", 2), ("go", 1)]));
    let notifier = ScriptedNotifier::new(vec![ChannelScript::Hold(vec![
        ChannelEvent::Open,
        changed(Some("v2")),
    ])]);
    let f = fixture(source, notifier);
    f.catalog.refresh().await.unwrap();

    f.listener.start();
    sleep(Duration::from_millis(100)).await;

    assert_eq!(f.source.fetch_count(), 2);
    assert_eq!(f.catalog.current_checksum().as_deref(), Some("v2"));
    assert_eq!(f.recorder.count(EventKind::CatalogUpdated), 2);
}

#[tokio::test(start_paused = true)]
async fn test_change_notice_with_held_checksum_is_ignored() {
    let notifier = ScriptedNotifier::new(vec![ChannelScript::Hold(vec![
        ChannelEvent::Open,
        changed(Some("v1")),
        changed(None),
    ])]);
    let f = fixture(
        ScriptedCatalogSource::with_body(catalog_body("v1", &[("rust", 2)])),
        notifier,
    );
    f.catalog.refresh().await.unwrap();

    f.listener.start();
    sleep(Duration::from_millis(100)).await;

    assert_eq!(f.source.fetch_count(), 1);
    assert_eq!(f.recorder.count(EventKind::CatalogUpdated), 1);
    assert_eq!(f.listener.state(), ListenerState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_close_cancels_pending_reconnect() {
    let f = fixture(ScriptedCatalogSource::new(), ScriptedNotifier::refusing());

    f.listener.start();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(f.listener.state(), ListenerState::Backoff);

    f.listener.close();
    sleep(Duration::from_secs(60)).await;

    assert_eq!(f.notifier.connect_count(), 1);
    assert_eq!(f.listener.state(), ListenerState::Closed);
    assert_eq!(f.recorder.count(EventKind::Offline), 0);
}

#[tokio::test(start_paused = true)]
async fn test_start_after_close_does_nothing() {
    let f = fixture(ScriptedCatalogSource::new(), ScriptedNotifier::refusing());

    f.listener.close();
    f.listener.start();
    sleep(Duration::from_secs(5)).await;

    assert_eq!(f.notifier.connect_count(), 0);
    assert!(f.recorder.events().is_empty());
}
