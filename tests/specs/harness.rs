// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared daemon harness for the specs: a real daemon on a temp state
//! directory, with shell scripts standing in for the shim and the OCI
//! runtime.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

use sv_core::{ContainerId, Event, ProcessId, SupervisorError};
use sv_daemon::{startup, Config, Daemon, Task};
use sv_daemon::task::{DeleteTask, StartTask, UpdateContainerTask};
use sv_runtime::Stdio;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::time::timeout;

pub const WAIT: Duration = Duration::from_secs(5);

/// Shim whose process stays up holding the exit FIFO. The sleep child
/// drops fd 3 so only the shim process pins the write end.
pub const SHIM_LONG: &str = "echo $$ > pid\nexec 3> exit\nsleep 10 3>&-\n";

/// Shim whose process exits cleanly after a moment.
pub const SHIM_SHORT: &str = "echo $$ > pid\nexec 3> exit\nsleep 0.3\necho 0 > exitStatus\n";

pub struct Harness {
    pub dir: TempDir,
    pub daemon: Daemon,
    pub state_dir: PathBuf,
    pub bundle: PathBuf,
    pub shim: String,
    pub runtime: String,
}

pub async fn boot(shim_body: &str, retention: usize) -> Harness {
    let dir = TempDir::new().unwrap();
    let shim = script(&dir, "fake-shim", shim_body);
    // `delete` kills the shim the way a real runtime tears the container
    // down, closing the exit FIFO.
    let runtime = script(
        &dir,
        "fake-runc",
        "if [ \"$1\" = \"delete\" ]; then\n  pkill -f \"$(dirname \"$0\")/fake-shim\" >/dev/null 2>&1 || true\nfi\nexit 0\n",
    );
    let bundle = dir.path().join("bundle");
    std::fs::create_dir_all(&bundle).unwrap();
    std::fs::write(
        bundle.join("config.json"),
        r#"{"process":{"terminal":false,"args":["sleep","30"],"cwd":"/"}}"#,
    )
    .unwrap();

    let state_dir = dir.path().join("state");
    let config = Config {
        lock_path: state_dir.join("daemon.pid"),
        journal_path: state_dir.join("events.log"),
        state_dir: state_dir.clone(),
        retention,
        defaults: Default::default(),
    };
    let daemon = startup(config).await.unwrap();
    Harness { dir, daemon, state_dir, bundle, shim, runtime }
}

fn script(dir: &TempDir, name: &str, body: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

impl Harness {
    pub async fn start(&self, id: &str) -> Result<Stdio, SupervisorError> {
        let (tx, rx) = oneshot::channel();
        self.daemon
            .tasks
            .send(Task::Start(StartTask {
                id: ContainerId::new(id),
                bundle: self.bundle.clone(),
                runtime: self.runtime.clone(),
                runtime_args: vec![],
                shim: self.shim.clone(),
                labels: vec![],
                no_pivot_root: false,
                checkpoint: None,
                timeout: Duration::from_secs(5),
                stdio: Stdio::null(),
                reply: tx,
            }))
            .await
            .unwrap();
        timeout(WAIT, rx).await.unwrap().unwrap()
    }

    pub async fn delete(&self, id: &str) -> Result<(), SupervisorError> {
        let (tx, rx) = oneshot::channel();
        self.daemon
            .tasks
            .send(Task::Delete(DeleteTask {
                id: ContainerId::new(id),
                process_id: ProcessId::init(),
                status: 0,
                no_event: false,
                reply: Some(tx),
            }))
            .await
            .unwrap();
        timeout(WAIT, rx).await.unwrap().unwrap()
    }

    pub async fn set_state(&self, id: &str, state: &str) -> Result<(), SupervisorError> {
        let (tx, rx) = oneshot::channel();
        self.daemon
            .tasks
            .send(Task::UpdateContainer(UpdateContainerTask {
                id: ContainerId::new(id),
                state: Some(state.to_string()),
                resources: None,
                reply: tx,
            }))
            .await
            .unwrap();
        timeout(WAIT, rx).await.unwrap().unwrap()
    }

    /// Poll the journal until it holds at least `count` events.
    pub async fn journal_events(&self, count: usize) -> Vec<Event> {
        let journal = sv_storage::Journal::open(&self.daemon.config.journal_path).unwrap();
        for _ in 0..100 {
            let events = journal.replay().unwrap();
            if events.len() >= count {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        journal.replay().unwrap()
    }
}
