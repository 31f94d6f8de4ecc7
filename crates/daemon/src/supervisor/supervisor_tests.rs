// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

use sv_core::{Checkpoint, ContainerId, Event, EventKind, ProcessId, SupervisorError};
use sv_runtime::Stdio;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::time::timeout;

use super::StartDefaults;
use crate::events::Subscription;
use crate::lifecycle::{startup, Config, Daemon};
use crate::task::*;

const WAIT: Duration = Duration::from_secs(5);

/// A fake shim that holds the exit FIFO open while it lives. The sleep
/// child drops fd 3 so only the shim process pins the write end.
const SHIM_LONG: &str = r#"echo $$ > pid
exec 3> exit
sleep 10 3>&-
"#;

/// A fake shim whose process exits cleanly after a moment.
const SHIM_SHORT: &str = r#"echo $$ > pid
exec 3> exit
sleep 0.3
echo 0 > exitStatus
"#;

struct Harness {
    _dir: TempDir,
    daemon: Daemon,
    state_dir: PathBuf,
    bundle: PathBuf,
    shim: String,
    runtime: String,
}

impl Harness {
    async fn boot_with(shim_body: &str, runtime_body: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let shim = script(&dir, "fake-shim", shim_body);
        let runtime = script(&dir, "fake-runc", runtime_body);
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
            retention: 0,
            defaults: StartDefaults {
                runtime: runtime.clone(),
                runtime_args: vec![],
                shim: shim.clone(),
                timeout: Duration::from_secs(5),
            },
        };
        let daemon = startup(config).await.unwrap();
        Self { _dir: dir, daemon, state_dir, bundle, shim, runtime }
    }

    async fn boot(shim_body: &str) -> Self {
        // Like the real runtime, the fake one tears the container down on
        // `delete`, which makes the shim close the exit FIFO and die.
        let runtime = r#"if [ "$1" = "delete" ]; then
  pkill -f "$(dirname "$0")/fake-shim" >/dev/null 2>&1 || true
fi
exit 0
"#;
        Self::boot_with(shim_body, runtime).await
    }

    /// Restart the daemon on the same state directory.
    async fn reboot(self) -> Self {
        let Harness { _dir, daemon, state_dir, bundle, shim, runtime } = self;
        daemon.shutdown().await.unwrap();
        let config = Config {
            lock_path: state_dir.join("daemon.pid"),
            journal_path: state_dir.join("events.log"),
            state_dir: state_dir.clone(),
            retention: 0,
            defaults: StartDefaults {
                runtime: runtime.clone(),
                runtime_args: vec![],
                shim: shim.clone(),
                timeout: Duration::from_secs(5),
            },
        };
        let daemon = startup(config).await.unwrap();
        Self { _dir, daemon, state_dir, bundle, shim, runtime }
    }

    fn subscribe(&self) -> Subscription {
        self.daemon.bus.subscribe(0, false, None)
    }

    async fn start(&self, id: &str) -> Result<Stdio, SupervisorError> {
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

    async fn delete(&self, id: &str) -> Result<(), SupervisorError> {
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

    async fn containers(&self) -> Result<Vec<ContainerInfo>, SupervisorError> {
        let (tx, rx) = oneshot::channel();
        self.daemon
            .tasks
            .send(Task::GetContainers(GetContainersTask { id: None, reply: tx }))
            .await
            .unwrap();
        timeout(WAIT, rx).await.unwrap().unwrap()
    }

    async fn update_state(&self, id: &str, state: &str) -> Result<(), SupervisorError> {
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
}

fn script(dir: &TempDir, name: &str, body: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

async fn next_event(sub: &mut Subscription) -> Event {
    timeout(WAIT, sub.rx.recv()).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_clean_start_then_exit_cleans_up() {
    let harness = Harness::boot(SHIM_SHORT).await;
    let mut sub = harness.subscribe();

    let stdio = harness.start("c1").await.unwrap();
    assert_eq!(stdio, Stdio::null());

    let started = next_event(&mut sub).await;
    assert_eq!(started.kind, EventKind::StartContainer);
    assert_eq!(started.id, "c1");

    // The shim exits on its own; the exit FIFO hangup drives delete.
    let exited = next_event(&mut sub).await;
    assert_eq!(exited.kind, EventKind::Exit);
    assert_eq!(exited.pid, "init");
    assert_eq!(exited.status, 0);
    assert!(exited.timestamp > started.timestamp);

    // Registry and state directory both cleaned.
    assert!(harness.containers().await.unwrap().is_empty());
    assert!(!harness.state_dir.join("c1").exists());

    harness.daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_start_failure_surfaces_shim_error_and_leaves_nothing() {
    let harness = Harness::boot(
        r#"echo '{"level":"error","msg":"runc: exec format error"}' > shim-log.json
exit 1
"#,
    )
    .await;

    let err = harness.start("c1").await.unwrap_err();
    assert_eq!(err.to_string(), "shim error: runc: exec format error");

    assert!(harness.containers().await.unwrap().is_empty());
    assert!(!harness.state_dir.join("c1").exists());

    harness.daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_exec_exit_emits_event_and_keeps_container_running() {
    // The same shim binary serves init and exec processes; it branches on
    // the process directory it is started in.
    let shim = r#"case "$(basename "$PWD")" in
  init)
    echo $$ > pid
    exec 3> exit
    sleep 10 3>&-
    ;;
  *)
    echo $$ > pid
    exec 3> exit
    sleep 0.3
    echo 7 > exitStatus
    ;;
esac
"#;
    let harness = Harness::boot(shim).await;
    let mut sub = harness.subscribe();

    harness.start("c1").await.unwrap();
    assert_eq!(next_event(&mut sub).await.kind, EventKind::StartContainer);

    let (tx, rx) = oneshot::channel();
    harness
        .daemon
        .tasks
        .send(Task::AddProcess(AddProcessTask {
            id: ContainerId::new("c1"),
            process_id: ProcessId::new("p2"),
            spec: sv_runtime::ProcessSpec {
                args: vec!["true".to_string()],
                ..Default::default()
            },
            stdio: Stdio::null(),
            reply: tx,
        }))
        .await
        .unwrap();
    let stdio = timeout(WAIT, rx).await.unwrap().unwrap().unwrap();
    assert_eq!(stdio, Stdio::null());

    // Exactly one exit event for p2; no event was emitted at exec time.
    let exited = next_event(&mut sub).await;
    assert_eq!(exited.kind, EventKind::Exit);
    assert_eq!(exited.pid, "p2");
    assert_eq!(exited.status, 7);

    let containers = harness.containers().await.unwrap();
    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].processes, vec![ProcessId::init()]);

    harness.daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_start_applies_daemon_defaults() {
    let harness = Harness::boot(SHIM_LONG).await;

    // Empty runtime/shim and a zero timeout fall back to the daemon
    // defaults configured at startup.
    let (tx, rx) = oneshot::channel();
    harness
        .daemon
        .tasks
        .send(Task::Start(StartTask {
            id: ContainerId::new("c1"),
            bundle: harness.bundle.clone(),
            runtime: String::new(),
            runtime_args: vec![],
            shim: String::new(),
            labels: vec![],
            no_pivot_root: false,
            checkpoint: None,
            timeout: Duration::ZERO,
            stdio: Stdio::null(),
            reply: tx,
        }))
        .await
        .unwrap();
    timeout(WAIT, rx).await.unwrap().unwrap().unwrap();

    // The resolved defaults are what the container was created with.
    let containers = harness.containers().await.unwrap();
    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].runtime, harness.runtime);

    harness.daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_starting_twice_fails_without_touching_the_first() {
    let harness = Harness::boot(SHIM_LONG).await;

    harness.start("c1").await.unwrap();
    let err = harness.start("c1").await.unwrap_err();
    assert!(matches!(err, SupervisorError::ContainerExists));

    let containers = harness.containers().await.unwrap();
    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].processes, vec![ProcessId::init()]);

    harness.daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let harness = Harness::boot(SHIM_LONG).await;

    harness.start("c1").await.unwrap();
    harness.delete("c1").await.unwrap();

    let err = harness.delete("c1").await.unwrap_err();
    assert!(matches!(err, SupervisorError::ContainerNotFound));
    assert!(!harness.state_dir.join("c1").exists());

    harness.daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_pause_then_resume_emits_exactly_one_event_each() {
    let harness = Harness::boot(SHIM_LONG).await;
    let mut sub = harness.subscribe();

    harness.start("c1").await.unwrap();
    assert_eq!(next_event(&mut sub).await.kind, EventKind::StartContainer);

    harness.update_state("c1", "paused").await.unwrap();
    let paused = next_event(&mut sub).await;
    assert_eq!(paused.kind, EventKind::Pause);

    harness.update_state("c1", "running").await.unwrap();
    let resumed = next_event(&mut sub).await;
    assert_eq!(resumed.kind, EventKind::Resume);
    assert!(resumed.timestamp > paused.timestamp);

    harness.daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_update_with_both_state_and_resources_is_rejected() {
    let harness = Harness::boot(SHIM_LONG).await;
    harness.start("c1").await.unwrap();

    let (tx, rx) = oneshot::channel();
    harness
        .daemon
        .tasks
        .send(Task::UpdateContainer(UpdateContainerTask {
            id: ContainerId::new("c1"),
            state: Some("paused".to_string()),
            resources: Some(sv_core::Resource::default()),
            reply: tx,
        }))
        .await
        .unwrap();
    let err = timeout(WAIT, rx).await.unwrap().unwrap().unwrap_err();
    assert!(matches!(err, SupervisorError::AmbiguousUpdate));

    harness.daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_target_state_is_a_taxonomy_error() {
    let harness = Harness::boot(SHIM_LONG).await;
    harness.start("c1").await.unwrap();

    let err = harness.update_state("c1", "frozen").await.unwrap_err();
    assert_eq!(err.to_string(), "unknown container status \"frozen\"");

    harness.daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_signal_unknown_process_is_process_not_found() {
    let harness = Harness::boot(SHIM_LONG).await;
    harness.start("c1").await.unwrap();

    let (tx, rx) = oneshot::channel();
    harness
        .daemon
        .tasks
        .send(Task::Signal(SignalTask {
            id: ContainerId::new("c1"),
            process_id: ProcessId::new("ghost"),
            signal: 15,
            reply: tx,
        }))
        .await
        .unwrap();
    let err = timeout(WAIT, rx).await.unwrap().unwrap().unwrap_err();
    assert!(matches!(err, SupervisorError::ProcessNotFound));

    harness.daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_checkpoint_create_and_delete_through_tasks() {
    let harness = Harness::boot(SHIM_LONG).await;
    harness.start("c1").await.unwrap();

    let checkpoint = Checkpoint {
        name: "snap".to_string(),
        created: 0,
        tcp: false,
        unix_sockets: false,
        shell: false,
        exit: false,
    };
    let (tx, rx) = oneshot::channel();
    harness
        .daemon
        .tasks
        .send(Task::CreateCheckpoint(CreateCheckpointTask {
            id: ContainerId::new("c1"),
            checkpoint: checkpoint.clone(),
            reply: tx,
        }))
        .await
        .unwrap();
    timeout(WAIT, rx).await.unwrap().unwrap().unwrap();

    // Duplicate name is rejected before the runtime is involved.
    let (tx, rx) = oneshot::channel();
    harness
        .daemon
        .tasks
        .send(Task::CreateCheckpoint(CreateCheckpointTask {
            id: ContainerId::new("c1"),
            checkpoint,
            reply: tx,
        }))
        .await
        .unwrap();
    let err = timeout(WAIT, rx).await.unwrap().unwrap().unwrap_err();
    assert!(matches!(err, SupervisorError::CheckpointExists));

    let (tx, rx) = oneshot::channel();
    harness
        .daemon
        .tasks
        .send(Task::DeleteCheckpoint(DeleteCheckpointTask {
            id: ContainerId::new("c1"),
            name: "snap".to_string(),
            reply: tx,
        }))
        .await
        .unwrap();
    timeout(WAIT, rx).await.unwrap().unwrap().unwrap();

    let (tx, rx) = oneshot::channel();
    harness
        .daemon
        .tasks
        .send(Task::DeleteCheckpoint(DeleteCheckpointTask {
            id: ContainerId::new("c1"),
            name: "snap".to_string(),
            reply: tx,
        }))
        .await
        .unwrap();
    let err = timeout(WAIT, rx).await.unwrap().unwrap().unwrap_err();
    assert!(matches!(err, SupervisorError::CheckpointNotExists));

    harness.daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_update_process_close_stdin_and_non_terminal_resize() {
    let harness = Harness::boot(SHIM_LONG).await;
    harness.start("c1").await.unwrap();

    let (tx, rx) = oneshot::channel();
    harness
        .daemon
        .tasks
        .send(Task::UpdateProcess(UpdateProcessTask {
            id: ContainerId::new("c1"),
            process_id: ProcessId::init(),
            close_stdin: true,
            resize: None,
            reply: tx,
        }))
        .await
        .unwrap();
    timeout(WAIT, rx).await.unwrap().unwrap().unwrap();

    // The bundle spec has terminal=false, so resize is refused.
    let (tx, rx) = oneshot::channel();
    harness
        .daemon
        .tasks
        .send(Task::UpdateProcess(UpdateProcessTask {
            id: ContainerId::new("c1"),
            process_id: ProcessId::init(),
            close_stdin: false,
            resize: Some((80, 24)),
            reply: tx,
        }))
        .await
        .unwrap();
    let err = timeout(WAIT, rx).await.unwrap().unwrap().unwrap_err();
    assert!(matches!(err, SupervisorError::TerminalsNotSupported(_)));

    harness.daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_oom_task_broadcasts_without_state_change() {
    let harness = Harness::boot(SHIM_LONG).await;
    harness.start("c1").await.unwrap();
    let mut sub = harness.subscribe();

    harness
        .daemon
        .tasks
        .send(Task::Oom(OomTask { id: ContainerId::new("c1") }))
        .await
        .unwrap();

    let event = next_event(&mut sub).await;
    assert_eq!(event.kind, EventKind::Oom);
    assert_eq!(event.id, "c1");
    assert_eq!(harness.containers().await.unwrap().len(), 1);

    harness.daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_restart_restores_registry_history_and_exit_watch() {
    let harness = Harness::boot(SHIM_LONG).await;
    let mut sub = harness.subscribe();
    harness.start("c1").await.unwrap();
    assert_eq!(next_event(&mut sub).await.kind, EventKind::StartContainer);
    drop(sub);

    // Give the recorder a beat to journal the event before restarting.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let history_before = harness.daemon.bus.history();
    assert_eq!(history_before.len(), 1);

    let harness = harness.reboot().await;

    // Replay re-populated the vector with exactly the same entries; no
    // events were re-emitted.
    assert_eq!(harness.daemon.bus.history(), history_before);

    let containers = harness.containers().await.unwrap();
    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].runtime, harness.runtime);
    assert_eq!(containers[0].processes, vec![ProcessId::init()]);

    // The restored exit watch still fires: kill the surviving shim.
    let mut sub = harness.subscribe();
    let pid = std::fs::read_to_string(harness.state_dir.join("c1").join("init").join("pid"))
        .unwrap()
        .trim()
        .to_string();
    std::process::Command::new("kill").arg(&pid).status().unwrap();

    let exited = next_event(&mut sub).await;
    assert_eq!(exited.kind, EventKind::Exit);
    assert_eq!(exited.id, "c1");
    assert!(!harness.state_dir.join("c1").exists());

    harness.daemon.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_journal_contains_the_lifecycle_events() {
    let harness = Harness::boot(SHIM_SHORT).await;
    let mut sub = harness.subscribe();
    harness.start("c1").await.unwrap();
    assert_eq!(next_event(&mut sub).await.kind, EventKind::StartContainer);
    assert_eq!(next_event(&mut sub).await.kind, EventKind::Exit);

    // The recorder runs off the loop thread; poll the file briefly.
    let journal = sv_storage::Journal::open(&harness.daemon.config.journal_path).unwrap();
    let mut events = vec![];
    for _ in 0..50 {
        events = journal.replay().unwrap();
        if events.len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, EventKind::StartContainer);
    assert_eq!(events[1].kind, EventKind::Exit);
    assert!(events[0].timestamp < events[1].timestamp);

    harness.daemon.shutdown().await.unwrap();
}
