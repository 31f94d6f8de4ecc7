// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exit routing, deletes, and OOM notices

use sv_core::{Clock, Event, SupervisorError};
use sv_runtime::UNKNOWN_STATUS;
use tracing::{debug, warn};

use crate::task::{DeleteTask, ExecExitTask, ExitTask, OomTask, Task};

use super::{reply, Slot, Supervisor};

impl<C: Clock> Supervisor<C> {
    /// Remove the container from the registry, clean up its state, reap
    /// the exited init's shim, and emit the terminal exit event.
    pub(super) async fn handle_delete(&mut self, t: DeleteTask) {
        let result = match self.registry.remove(&t.id) {
            Some(Slot::Ready(mut container)) => {
                let deleted = container.delete().await;
                if let Some(mut process) = container.remove_process(&t.process_id) {
                    if let Some(mut shim) = process.take_shim() {
                        let _ = shim.wait().await;
                    }
                }
                if !t.no_event {
                    self.publish(Event::exit(
                        t.id.clone(),
                        t.process_id.as_str(),
                        t.status,
                        0,
                    ));
                }
                deleted
            }
            Some(Slot::Starting) => {
                // The container is out with a start worker; put the marker
                // back and report the miss.
                self.registry.insert(t.id.clone(), Slot::Starting);
                Err(SupervisorError::ContainerNotFound)
            }
            None => Err(SupervisorError::ContainerNotFound),
        };
        match t.reply {
            Some(tx) => reply(tx, result),
            None => {
                if let Err(e) = result {
                    warn!(container = %t.id, error = %e, "exit-driven delete failed");
                }
            }
        }
    }

    /// The monitor observed an exit: init exits become deletes, other
    /// exits become exec-exits.
    pub(super) fn handle_exit(&mut self, t: ExitTask) {
        let routed = match self.registry.get(&t.id) {
            Some(Slot::Ready(container)) => {
                if t.process_id.is_init() {
                    let status = container
                        .process(&t.process_id)
                        .map(|p| p.exit_status())
                        .unwrap_or(UNKNOWN_STATUS);
                    Some(Task::Delete(DeleteTask {
                        id: t.id,
                        process_id: t.process_id,
                        status,
                        no_event: false,
                        reply: None,
                    }))
                } else {
                    Some(Task::ExecExit(ExecExitTask {
                        id: t.id,
                        process_id: t.process_id,
                    }))
                }
            }
            Some(Slot::Starting) => {
                // Raced ahead of the worker's StartDone; requeue behind it
                // through the channel, not the priority queue.
                let task_tx = self.task_tx.clone();
                tokio::spawn(async move {
                    let _ = task_tx.send(Task::Exit(t)).await;
                });
                None
            }
            None => {
                debug!(container = %t.id, process = %t.process_id, "exit for unknown container");
                None
            }
        };
        if let Some(task) = routed {
            self.enqueue(task);
        }
    }

    /// A non-init process exited: remove it from its container, reap it in
    /// a detached task so outstanding IO children can drain, then emit the
    /// terminal exit event for this pid.
    pub(super) fn handle_exec_exit(&mut self, t: ExecExitTask) {
        let Ok(container) = self.ready_mut(&t.id) else {
            debug!(container = %t.id, "exec exit for unknown container");
            return;
        };
        let Some(mut process) = container.remove_process(&t.process_id) else {
            debug!(container = %t.id, process = %t.process_id, "exec exit for unknown process");
            return;
        };
        let status = process.exit_status();
        let event = self.bus.stamp(
            Event::exit(t.id, t.process_id.as_str(), status, 0),
            self.clock.epoch_ms(),
        );
        let bus = self.bus.clone();
        tokio::spawn(async move {
            if let Some(mut shim) = process.take_shim() {
                let _ = shim.wait().await;
            }
            if let Err(e) = process.remove() {
                debug!(error = %e, "exec process cleanup");
            }
            bus.publish(event);
        });
    }

    /// Notify subscribers; no state change.
    pub(super) fn handle_oom(&mut self, t: OomTask) {
        self.publish(Event::oom(t.id, 0));
    }
}
