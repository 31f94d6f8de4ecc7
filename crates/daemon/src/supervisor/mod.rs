// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The supervisor loop: strictly single consumer of the task channel and
//! the only mutator of the container registry.
//!
//! Long-running work never blocks the loop: container starts run on a
//! worker pool and come back as [`Task::StartDone`]; monitor notices are
//! forwarded into the same task channel so ordering per container is the
//! kernel's close order.

mod lifecycle;
mod process;
mod query;
mod restore;
mod start;
mod update;

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use sv_core::{Clock, ContainerId, Event, SupervisorError, SystemClock};
use sv_monitor::Monitor;
use sv_runtime::Container;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::events::EventBus;
use crate::task::Task;

pub(crate) use start::{spawn_start_workers, StartWork};

/// Number of workers performing blocking container starts.
pub const START_WORKERS: usize = 10;

/// Daemon-level defaults applied to start tasks whose runtime, shim, or
/// timeout was left unset by the caller.
#[derive(Debug, Clone)]
pub struct StartDefaults {
    pub runtime: String,
    pub runtime_args: Vec<String>,
    pub shim: String,
    pub timeout: std::time::Duration,
}

impl Default for StartDefaults {
    fn default() -> Self {
        Self {
            runtime: "runc".to_string(),
            runtime_args: Vec::new(),
            shim: "stevedore-shim".to_string(),
            timeout: std::time::Duration::from_secs(15),
        }
    }
}

/// A registry entry: the container is either out with a start worker or
/// owned by the loop.
enum Slot {
    Starting,
    Ready(Box<Container>),
}

/// Single-writer task dispatcher owning the container registry.
pub struct Supervisor<C: Clock = SystemClock> {
    state_dir: PathBuf,
    registry: HashMap<ContainerId, Slot>,
    monitor: Monitor,
    bus: EventBus,
    clock: C,
    /// Handle for workers and forwarders feeding the loop.
    task_tx: mpsc::Sender<Task>,
    /// Dropped at shutdown to stop the worker pool.
    start_tx: Option<mpsc::Sender<StartWork>>,
    /// Internally produced tasks, consumed before the channel.
    pending: VecDeque<Task>,
    defaults: StartDefaults,
}

impl<C: Clock> Supervisor<C> {
    pub(crate) fn new(
        state_dir: PathBuf,
        monitor: Monitor,
        bus: EventBus,
        clock: C,
        task_tx: mpsc::Sender<Task>,
        start_tx: mpsc::Sender<StartWork>,
        defaults: StartDefaults,
    ) -> Self {
        Self {
            state_dir,
            registry: HashMap::new(),
            monitor,
            bus,
            clock,
            task_tx,
            start_tx: Some(start_tx),
            pending: VecDeque::new(),
            defaults,
        }
    }

    /// Consume tasks until shutdown. Internally enqueued tasks run before
    /// anything new is pulled from the channel.
    pub async fn run(mut self, mut task_rx: mpsc::Receiver<Task>) {
        loop {
            let task = match self.pending.pop_front() {
                Some(task) => task,
                None => match task_rx.recv().await {
                    Some(task) => task,
                    None => break,
                },
            };
            debug!(task = task.name(), "dispatch");
            match task {
                Task::Shutdown(ack) => {
                    // Refuse new input first so forwarders and workers
                    // unblock, then tear down collaborators.
                    task_rx.close();
                    self.shutdown();
                    let _ = ack.send(());
                    break;
                }
                task => self.dispatch(task).await,
            }
        }
    }

    async fn dispatch(&mut self, task: Task) {
        match task {
            Task::Start(t) => self.handle_start(t).await,
            Task::StartDone(t) => self.handle_start_done(t),
            Task::Delete(t) => self.handle_delete(t).await,
            Task::Exit(t) => self.handle_exit(t),
            Task::ExecExit(t) => self.handle_exec_exit(t),
            Task::AddProcess(t) => self.handle_add_process(t).await,
            Task::Signal(t) => self.handle_signal(t),
            Task::GetContainers(t) => self.handle_get_containers(t),
            Task::Stats(t) => self.handle_stats(t).await,
            Task::CreateCheckpoint(t) => self.handle_create_checkpoint(t).await,
            Task::DeleteCheckpoint(t) => self.handle_delete_checkpoint(t),
            Task::UpdateContainer(t) => self.handle_update_container(t).await,
            Task::UpdateProcess(t) => self.handle_update_process(t),
            Task::Oom(t) => self.handle_oom(t),
            Task::Shutdown(_) => {}
        }
    }

    /// Idempotent teardown: stop the start pool, the monitor, and the
    /// subscriber set (which lets the journal recorder drain and exit).
    fn shutdown(&mut self) {
        info!("supervisor shutting down");
        self.start_tx = None;
        self.monitor.close();
        self.bus.close();
    }

    fn now(&self) -> u64 {
        self.clock.epoch_ms()
    }

    /// Stamp and broadcast one event.
    pub(crate) fn publish(&self, event: Event) {
        let event = self.bus.stamp(event, self.now());
        self.bus.publish(event);
    }

    pub(crate) fn enqueue(&mut self, task: Task) {
        self.pending.push_back(task);
    }

    fn ready(&self, id: &ContainerId) -> Result<&Container, SupervisorError> {
        match self.registry.get(id) {
            Some(Slot::Ready(container)) => Ok(container),
            Some(Slot::Starting) | None => Err(SupervisorError::ContainerNotFound),
        }
    }

    fn ready_mut(&mut self, id: &ContainerId) -> Result<&mut Container, SupervisorError> {
        match self.registry.get_mut(id) {
            Some(Slot::Ready(container)) => Ok(container),
            Some(Slot::Starting) | None => Err(SupervisorError::ContainerNotFound),
        }
    }

    /// Number of registered containers (tests and queries).
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}

/// Forward monitor exit notices into the task channel.
pub(crate) fn spawn_exit_forwarder(
    mut exits: mpsc::Receiver<sv_monitor::ExitNotice>,
    task_tx: mpsc::Sender<Task>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notice) = exits.recv().await {
            let task = Task::Exit(crate::task::ExitTask {
                id: notice.container_id,
                process_id: notice.process_id,
            });
            if task_tx.send(task).await.is_err() {
                break;
            }
        }
    })
}

/// Forward monitor OOM notices into the task channel.
pub(crate) fn spawn_oom_forwarder(
    mut ooms: mpsc::Receiver<sv_monitor::OomNotice>,
    task_tx: mpsc::Sender<Task>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notice) = ooms.recv().await {
            let task = Task::Oom(crate::task::OomTask { id: notice.container_id });
            if task_tx.send(task).await.is_err() {
                break;
            }
        }
    })
}

/// A reply send can only fail when the caller went away; not an error.
pub(crate) fn reply<T>(tx: crate::task::Reply<T>, result: Result<T, SupervisorError>) {
    if tx.send(result).is_err() {
        warn!("task reply dropped: caller gone");
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
