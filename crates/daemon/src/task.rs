// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tasks consumed by the supervisor loop
//!
//! Each task variant owns its inputs and, where the operation has a
//! caller, a single-use reply channel. A handler that defers work moves
//! the sender into the worker, so a reply is sent exactly once by
//! construction.

use std::path::PathBuf;

use sv_core::{Checkpoint, ContainerId, ProcessId, Resource, SupervisorError};
use sv_runtime::{Container, ProcessSpec, Stat, Stdio};
use tokio::sync::oneshot;

/// Single-use reply channel carried by caller-facing tasks.
pub type Reply<T> = oneshot::Sender<Result<T, SupervisorError>>;

/// A unit of work for the supervisor loop.
pub enum Task {
    Start(StartTask),
    Delete(DeleteTask),
    Exit(ExitTask),
    ExecExit(ExecExitTask),
    AddProcess(AddProcessTask),
    Signal(SignalTask),
    GetContainers(GetContainersTask),
    Stats(StatsTask),
    CreateCheckpoint(CreateCheckpointTask),
    DeleteCheckpoint(DeleteCheckpointTask),
    UpdateContainer(UpdateContainerTask),
    UpdateProcess(UpdateProcessTask),
    Oom(OomTask),
    /// Internal: a start worker finished and hands the container back.
    StartDone(StartDoneTask),
    /// Internal: drain and stop the loop.
    Shutdown(oneshot::Sender<()>),
}

/// Create a container and start its init process. The reply (the three
/// stdio FIFO paths) is deferred to a start worker.
pub struct StartTask {
    pub id: ContainerId,
    pub bundle: PathBuf,
    /// OCI runtime binary; empty means the daemon default.
    pub runtime: String,
    /// Prefix args for every runtime invocation; empty means the daemon
    /// default.
    pub runtime_args: Vec<String>,
    /// Shim binary; empty means the daemon default.
    pub shim: String,
    pub labels: Vec<String>,
    pub no_pivot_root: bool,
    /// Restore from this checkpoint instead of a fresh start.
    pub checkpoint: Option<String>,
    /// Bounded time to wait for the shim to report started; zero means
    /// the daemon default.
    pub timeout: std::time::Duration,
    pub stdio: Stdio,
    pub reply: Reply<Stdio>,
}

/// Remove a container from the registry and clean up its state.
pub struct DeleteTask {
    pub id: ContainerId,
    /// Process whose exit triggered the delete (normally init).
    pub process_id: ProcessId,
    pub status: u32,
    /// Suppress the exit event (cleanup deletes).
    pub no_event: bool,
    /// Present for client-requested deletes, absent for exit-driven ones.
    pub reply: Option<Reply<()>>,
}

/// The monitor observed a process exit.
pub struct ExitTask {
    pub id: ContainerId,
    pub process_id: ProcessId,
}

/// A non-init process exited; remove it without touching the container.
pub struct ExecExitTask {
    pub id: ContainerId,
    pub process_id: ProcessId,
}

/// Start an additional process inside a running container.
pub struct AddProcessTask {
    pub id: ContainerId,
    pub process_id: ProcessId,
    pub spec: ProcessSpec,
    pub stdio: Stdio,
    pub reply: Reply<Stdio>,
}

pub struct SignalTask {
    pub id: ContainerId,
    pub process_id: ProcessId,
    pub signal: i32,
    pub reply: Reply<()>,
}

pub struct GetContainersTask {
    /// Restrict to one container; a miss is container-not-found.
    pub id: Option<ContainerId>,
    pub reply: Reply<Vec<ContainerInfo>>,
}

pub struct StatsTask {
    pub id: ContainerId,
    pub reply: Reply<Stat>,
}

pub struct CreateCheckpointTask {
    pub id: ContainerId,
    pub checkpoint: Checkpoint,
    pub reply: Reply<()>,
}

pub struct DeleteCheckpointTask {
    pub id: ContainerId,
    pub name: String,
    pub reply: Reply<()>,
}

/// Exactly one of `state` / `resources` may be set; both at once is
/// rejected instead of silently dropping the resources.
pub struct UpdateContainerTask {
    pub id: ContainerId,
    /// Target state: `"paused"` or `"running"`.
    pub state: Option<String>,
    pub resources: Option<Resource>,
    pub reply: Reply<()>,
}

pub struct UpdateProcessTask {
    pub id: ContainerId,
    pub process_id: ProcessId,
    pub close_stdin: bool,
    pub resize: Option<(u16, u16)>,
    pub reply: Reply<()>,
}

/// The monitor observed an OOM kill in the container's memory cgroup.
pub struct OomTask {
    pub id: ContainerId,
}

pub struct StartDoneTask {
    pub id: ContainerId,
    /// The container on success; `None` when the worker already cleaned up
    /// a failed start.
    pub container: Option<Box<Container>>,
}

/// Registry summary returned by GetContainers; built without invoking the
/// runtime so the loop never blocks on a query.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: ContainerId,
    pub bundle: PathBuf,
    pub runtime: String,
    pub labels: Vec<String>,
    pub processes: Vec<ProcessId>,
}

impl Task {
    /// Task name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Task::Start(_) => "start",
            Task::Delete(_) => "delete",
            Task::Exit(_) => "exit",
            Task::ExecExit(_) => "exec-exit",
            Task::AddProcess(_) => "add-process",
            Task::Signal(_) => "signal",
            Task::GetContainers(_) => "get-containers",
            Task::Stats(_) => "stats",
            Task::CreateCheckpoint(_) => "create-checkpoint",
            Task::DeleteCheckpoint(_) => "delete-checkpoint",
            Task::UpdateContainer(_) => "update-container",
            Task::UpdateProcess(_) => "update-process",
            Task::Oom(_) => "oom",
            Task::StartDone(_) => "start-done",
            Task::Shutdown(_) => "shutdown",
        }
    }
}
