// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container lifecycle specs: journal ordering and cleanup guarantees

use sv_core::EventKind;

use super::harness::{boot, SHIM_LONG, SHIM_SHORT};

#[tokio::test]
async fn init_exit_is_always_preceded_by_its_start_in_journal_order() {
    let harness = boot(SHIM_SHORT, 0).await;

    harness.start("c1").await.unwrap();

    let events = harness.journal_events(2).await;
    let start_pos = events
        .iter()
        .position(|e| e.kind == EventKind::StartContainer && e.id == "c1");
    let exit_pos = events
        .iter()
        .position(|e| e.kind == EventKind::Exit && e.id == "c1" && e.pid == "init");
    assert!(start_pos.unwrap() < exit_pos.unwrap());

    harness.daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn client_delete_emits_exit_and_cleans_the_state_dir() {
    let harness = boot(SHIM_LONG, 0).await;

    harness.start("c1").await.unwrap();
    assert!(harness.state_dir.join("c1").join("init").join("pid").exists());

    harness.delete("c1").await.unwrap();
    assert!(!harness.state_dir.join("c1").exists());

    let events = harness.journal_events(2).await;
    assert_eq!(events.last().unwrap().kind, EventKind::Exit);
    assert_eq!(events.last().unwrap().pid, "init");

    harness.daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn shims_survive_daemon_shutdown() {
    let harness = boot(SHIM_LONG, 0).await;
    harness.start("c1").await.unwrap();

    let pid: i32 = std::fs::read_to_string(
        harness.state_dir.join("c1").join("init").join("pid"),
    )
    .unwrap()
    .trim()
    .parse()
    .unwrap();

    let super::harness::Harness { dir, daemon, .. } = harness;
    daemon.shutdown().await.unwrap();

    // The shim was spawned in its own process group and is not killed at
    // shutdown; it must still be alive.
    let alive = std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .unwrap()
        .success();
    assert!(alive);

    let _ = std::process::Command::new("kill").arg(pid.to_string()).status();
    drop(dir);
}
