// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deferred container starts
//!
//! The start handler validates, creates the container on disk, marks the
//! registry slot, and hands the container to a worker. The worker runs the
//! shim start protocol, registers the exit watch, answers the caller, and
//! sends the container back to the loop as a StartDone task. On failure it
//! cleans up and sends the slot release instead, so a failed start leaves
//! no trace.

use std::sync::Arc;

use sv_core::{Clock, Event, ProcessId, SupervisorError};
use sv_monitor::Monitor;
use sv_runtime::{Container, ContainerOpts, Stdio};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::events::EventBus;
use crate::task::{Reply, StartDoneTask, StartTask, Task};

use super::{reply, Slot, Supervisor};

/// Work item handed to the start pool: the container travels with it.
pub(crate) struct StartWork {
    pub container: Box<Container>,
    pub checkpoint: Option<String>,
    pub stdio: Stdio,
    pub reply: Reply<Stdio>,
}

impl<C: Clock> Supervisor<C> {
    pub(super) async fn handle_start(&mut self, t: StartTask) {
        // Daemon defaults fill in whatever the caller left unset.
        let runtime = if t.runtime.is_empty() {
            self.defaults.runtime.clone()
        } else {
            t.runtime
        };
        let runtime_args = if t.runtime_args.is_empty() {
            self.defaults.runtime_args.clone()
        } else {
            t.runtime_args
        };
        let shim = if t.shim.is_empty() { self.defaults.shim.clone() } else { t.shim };
        let timeout = if t.timeout.is_zero() { self.defaults.timeout } else { t.timeout };

        if !t.bundle.is_absolute() {
            reply(
                t.reply,
                Err(SupervisorError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "bundle path must be absolute",
                ))),
            );
            return;
        }
        if runtime.is_empty() || shim.is_empty() {
            reply(t.reply, Err(SupervisorError::InvalidContainerType(runtime)));
            return;
        }
        if self.registry.contains_key(&t.id) {
            reply(t.reply, Err(SupervisorError::ContainerExists));
            return;
        }

        let opts = ContainerOpts {
            id: t.id.clone(),
            bundle: t.bundle,
            runtime,
            runtime_args,
            shim,
            labels: t.labels,
            no_pivot_root: t.no_pivot_root,
            timeout,
        };
        let container = match Container::create(&self.state_dir, opts) {
            Ok(container) => container,
            Err(e) => {
                reply(t.reply, Err(e));
                return;
            }
        };

        self.registry.insert(t.id.clone(), Slot::Starting);
        let work = StartWork {
            container: Box::new(container),
            checkpoint: t.checkpoint,
            stdio: t.stdio,
            reply: t.reply,
        };
        let Some(start_tx) = self.start_tx.clone() else {
            self.registry.remove(&t.id);
            reply(work.reply, Err(shutting_down()));
            return;
        };
        if let Err(send_error) = start_tx.send(work).await {
            self.registry.remove(&t.id);
            reply(send_error.0.reply, Err(shutting_down()));
        }
    }

    pub(super) fn handle_start_done(&mut self, t: StartDoneTask) {
        match t.container {
            Some(container) => {
                self.registry.insert(t.id, Slot::Ready(container));
            }
            None => {
                self.registry.remove(&t.id);
            }
        }
    }
}

fn shutting_down() -> SupervisorError {
    SupervisorError::Io(std::io::Error::other("supervisor shutting down"))
}

/// Spawn the fixed pool of start workers sharing one work channel.
pub(crate) fn spawn_start_workers<C: Clock + 'static>(
    count: usize,
    work_rx: mpsc::Receiver<StartWork>,
    monitor: Monitor,
    bus: EventBus,
    task_tx: mpsc::Sender<Task>,
    clock: C,
) -> Vec<tokio::task::JoinHandle<()>> {
    let work_rx = Arc::new(tokio::sync::Mutex::new(work_rx));
    (0..count)
        .map(|_| {
            let work_rx = Arc::clone(&work_rx);
            let monitor = monitor.clone();
            let bus = bus.clone();
            let task_tx = task_tx.clone();
            let clock = clock.clone();
            tokio::spawn(async move {
                loop {
                    let work = { work_rx.lock().await.recv().await };
                    match work {
                        Some(work) => run_start(work, &monitor, &bus, &task_tx, &clock).await,
                        None => break,
                    }
                }
            })
        })
        .collect()
}

/// Run one container start to completion on a worker.
async fn run_start<C: Clock>(
    work: StartWork,
    monitor: &Monitor,
    bus: &EventBus,
    task_tx: &mpsc::Sender<Task>,
    clock: &C,
) {
    let mut container = work.container;
    let id = container.id().clone();

    let started = container
        .start(work.checkpoint.as_deref(), work.stdio.clone())
        .await
        .map(|_| ());
    // A successful start requires the exit watch in place before the
    // caller hears about it.
    let started = started.and_then(|()| {
        container
            .process_mut(&ProcessId::init())
            .ok_or(SupervisorError::ContainerNotStarted)
            .and_then(|p| p.take_exit_pipe())
            .and_then(|fd| {
                monitor
                    .watch_exit(id.clone(), ProcessId::init(), fd)
                    .map_err(SupervisorError::from)
            })
    });

    match started {
        Ok(()) => {
            let watched = container.oom_cgroup_dir().and_then(|dir| {
                monitor
                    .watch_oom(id.clone(), &dir)
                    .map_err(SupervisorError::from)
            });
            if let Err(e) = watched {
                // The container may already be gone, or the host has no
                // memory cgroup; exits still work either way.
                debug!(container = %id, error = %e, "oom watch not registered");
            }
            reply(work.reply, Ok(work.stdio));
            let event = bus.stamp(Event::start_container(id.clone(), 0), clock.epoch_ms());
            bus.publish(event);
            let done = StartDoneTask { id, container: Some(container) };
            let _ = task_tx.send(Task::StartDone(done)).await;
        }
        Err(e) => {
            warn!(container = %id, error = %e, "container start failed");
            reply(work.reply, Err(e));
            if let Err(cleanup) = container.delete().await {
                debug!(container = %id, error = %cleanup, "cleanup after failed start");
            }
            let done = StartDoneTask { id, container: None };
            let _ = task_tx.send(Task::StartDone(done)).await;
        }
    }
}
