// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscriber replay and journal retention specs

use sv_core::{ContainerId, EventKind};
use tokio::time::timeout;

use super::harness::{boot, SHIM_LONG, WAIT};

#[tokio::test]
async fn subscriber_replays_only_events_newer_than_from() {
    let harness = boot(SHIM_LONG, 0).await;

    harness.start("c1").await.unwrap();
    harness.set_state("c1", "paused").await.unwrap();
    harness.set_state("c1", "running").await.unwrap();

    let events = harness.journal_events(3).await;
    assert_eq!(events.len(), 3);
    let start_ts = events[0].timestamp;

    // Everything after the start event replays, in order.
    let mut sub = harness.daemon.bus.subscribe(start_ts, true, None);
    let first = timeout(WAIT, sub.rx.recv()).await.unwrap().unwrap();
    let second = timeout(WAIT, sub.rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.kind, EventKind::Pause);
    assert_eq!(second.kind, EventKind::Resume);
    assert!(timeout(WAIT, sub.rx.recv()).await.unwrap().is_none());

    harness.daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn subscriber_from_later_than_everything_gets_empty_replay_then_live() {
    let harness = boot(SHIM_LONG, 0).await;

    harness.start("c1").await.unwrap();
    let events = harness.journal_events(1).await;
    let last_ts = events.last().unwrap().timestamp;

    // Not stored-only: empty replay, then registered for future events.
    let mut sub = harness.daemon.bus.subscribe(last_ts + 1_000_000, false, None);
    harness.set_state("c1", "paused").await.unwrap();
    let live = timeout(WAIT, sub.rx.recv()).await.unwrap().unwrap();
    assert_eq!(live.kind, EventKind::Pause);

    harness.daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn subscriber_filter_restricts_to_one_container() {
    let harness = boot(SHIM_LONG, 0).await;

    harness.start("c1").await.unwrap();
    harness.start("c2").await.unwrap();
    harness.journal_events(2).await;

    let mut sub = harness
        .daemon
        .bus
        .subscribe(1, true, Some(ContainerId::new("c2")));
    let only = timeout(WAIT, sub.rx.recv()).await.unwrap().unwrap();
    assert_eq!(only.id, "c2");
    assert!(timeout(WAIT, sub.rx.recv()).await.unwrap().is_none());

    harness.daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn retention_bounds_the_on_disk_journal() {
    let harness = boot(SHIM_LONG, 3).await;

    // 1 start + 4 pause/resume cycles = 5 events through the recorder.
    harness.start("c1").await.unwrap();
    harness.set_state("c1", "paused").await.unwrap();
    harness.set_state("c1", "running").await.unwrap();
    harness.set_state("c1", "paused").await.unwrap();
    harness.set_state("c1", "running").await.unwrap();

    // The 4th emission truncates the journal down to the most recent
    // count-1 events; the 5th is an ordinary append onto that set. Poll
    // until the recorder has processed all five, then check the exact
    // retained set: resume, pause, resume (events 3, 4, 5).
    let journal = sv_storage::Journal::open(&harness.daemon.config.journal_path).unwrap();
    let mut events = vec![];
    for _ in 0..100 {
        events = journal.replay().unwrap();
        if events.len() == 3 && events[0].kind == EventKind::Resume {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(
        events.iter().map(|e| e.kind).collect::<Vec<_>>(),
        vec![EventKind::Resume, EventKind::Pause, EventKind::Resume]
    );
    assert!(events.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

    harness.daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn journal_survives_restart_with_identical_contents() {
    let harness = boot(SHIM_LONG, 0).await;
    harness.start("c1").await.unwrap();
    harness.set_state("c1", "paused").await.unwrap();

    let before = harness.journal_events(2).await;
    assert_eq!(before.len(), 2);

    let super::harness::Harness { dir, daemon, state_dir, .. } = harness;
    daemon.shutdown().await.unwrap();

    let config = sv_daemon::Config {
        lock_path: state_dir.join("daemon.pid"),
        journal_path: state_dir.join("events.log"),
        state_dir,
        retention: 0,
        defaults: Default::default(),
    };
    let daemon = sv_daemon::startup(config).await.unwrap();
    assert_eq!(daemon.bus.history(), before);
    daemon.shutdown().await.unwrap();
    drop(dir);
}
