// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, shutdown, recovery.

mod startup;
pub use startup::startup;

use std::fs::File;
use std::path::PathBuf;

use sv_core::SupervisorError;
use sv_monitor::MonitorError;
use sv_storage::JournalError;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::events::EventBus;
use crate::supervisor::StartDefaults;
use crate::task::Task;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory; one subdirectory per container plus the
    /// journal and the lock file.
    pub state_dir: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to the event journal
    pub journal_path: PathBuf,
    /// Journaled-event retention count; zero disables rollover.
    pub retention: usize,
    /// Defaults applied to start tasks whose runtime, shim, or timeout
    /// was left unset.
    pub defaults: StartDefaults,
}

impl Config {
    /// Resolve paths under `state_dir`, falling back to the user state
    /// directory (`$XDG_STATE_HOME/stevedore`).
    pub fn load(state_dir: Option<PathBuf>, retention: usize) -> Result<Self, LifecycleError> {
        let state_dir = match state_dir {
            Some(dir) => dir,
            None => dirs::state_dir()
                .map(|d| d.join("stevedore"))
                .ok_or(LifecycleError::NoStateDir)?,
        };
        Ok(Self {
            lock_path: state_dir.join("daemon.pid"),
            journal_path: state_dir.join("events.log"),
            state_dir,
            retention,
            defaults: StartDefaults::default(),
        })
    }
}

/// A running daemon: the supervisor loop plus its collaborators.
#[derive(Debug)]
pub struct Daemon {
    /// Configuration
    pub config: Config,
    // NOTE(lifetime): held to maintain the exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    /// Event fan-out, for subscribers.
    pub bus: EventBus,
    /// Producer side of the supervisor's task channel.
    pub tasks: mpsc::Sender<Task>,
    pub(crate) loop_handle: JoinHandle<()>,
    pub(crate) recorder: JoinHandle<()>,
}

impl Daemon {
    /// Graceful, idempotent shutdown: stop intake, drain the loop and the
    /// journal recorder, release the lock file. Shims are left running.
    pub async fn shutdown(self) -> Result<(), LifecycleError> {
        info!("shutting down daemon");
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tasks.send(Task::Shutdown(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
        let _ = self.loop_handle.await;
        let _ = self.recorder.await;

        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!(error = %e, "failed to remove pid file");
            }
        }
        info!("daemon shutdown complete");
        Ok(())
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine state directory")]
    NoStateDir,

    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("monitor error: {0}")]
    Monitor(#[from] MonitorError),

    #[error("supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
