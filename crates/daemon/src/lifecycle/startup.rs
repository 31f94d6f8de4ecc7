// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and initialization logic.

use std::io::Write;

use fs2::FileExt;
use sv_core::SystemClock;
use sv_monitor::Monitor;
use sv_storage::Journal;
use tokio::sync::mpsc;
use tracing::info;

use crate::events::{spawn_recorder, EventBus, DEFAULT_BUFFER_SIZE};
use crate::supervisor::{
    spawn_exit_forwarder, spawn_oom_forwarder, spawn_start_workers, Supervisor, START_WORKERS,
};

use super::{Config, Daemon, LifecycleError};

/// Start the daemon: lock the state directory, replay the journal,
/// construct the monitor, restore containers, and spawn the loop.
pub async fn startup(config: Config) -> Result<Daemon, LifecycleError> {
    // 1. State directory first: socket-free, but the lock lives in it.
    std::fs::create_dir_all(&config.state_dir)?;

    // 2. Acquire the lock file before anything else. Open without
    // truncating so a failed lock does not wipe the running daemon's pid.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file; // drop mutability

    // 3. Journal replay populates the in-memory event vector; a malformed
    // tail is tolerated.
    let journal = Journal::open(&config.journal_path)?;
    let replayed = journal.replay()?;
    if !replayed.is_empty() {
        info!(events = replayed.len(), "replayed journal");
    }
    let bus = EventBus::new(replayed, config.retention);
    let recorder = spawn_recorder(bus.clone(), journal);

    // 4. Monitor thread plus the forwarders that turn its notices into
    // tasks on the single loop channel.
    let (monitor, exits_rx, ooms_rx) = Monitor::new()?;
    let (task_tx, task_rx) = mpsc::channel(DEFAULT_BUFFER_SIZE);
    let _ = spawn_exit_forwarder(exits_rx, task_tx.clone());
    let _ = spawn_oom_forwarder(ooms_rx, task_tx.clone());

    // 5. Start worker pool.
    let (start_tx, start_rx) = mpsc::channel(DEFAULT_BUFFER_SIZE);
    let _workers = spawn_start_workers(
        START_WORKERS,
        start_rx,
        monitor.clone(),
        bus.clone(),
        task_tx.clone(),
        SystemClock,
    );

    // 6. Restore surviving containers before consuming any task.
    let mut supervisor = Supervisor::new(
        config.state_dir.clone(),
        monitor,
        bus.clone(),
        SystemClock,
        task_tx.clone(),
        start_tx,
        config.defaults.clone(),
    );
    supervisor.restore()?;

    let loop_handle = tokio::spawn(supervisor.run(task_rx));
    info!(state_dir = %config.state_dir.display(), "daemon started");

    Ok(Daemon {
        config,
        lock_file,
        bus,
        tasks: task_tx,
        loop_handle,
        recorder,
    })
}
