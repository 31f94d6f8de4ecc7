// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup restore: rebuild the registry from the state directory
//!
//! Runs after the monitor and journal replay are initialized, before the
//! loop starts consuming tasks. No events are re-emitted for surviving
//! state; dead processes are synthesized as exit tasks so the normal exit
//! path cleans them up.

use sv_core::{Clock, ContainerId, ProcessId, SupervisorError};
use sv_runtime::Container;
use tracing::{debug, info, warn};

use crate::task::{ExitTask, Task};

use super::{Slot, Supervisor};

impl<C: Clock> Supervisor<C> {
    /// Enumerate `<state-dir>/*` and load each directory as a container. A
    /// load error halts startup; only an unreadable pid file is tolerated
    /// (that process is treated as exited).
    pub fn restore(&mut self) -> Result<(), SupervisorError> {
        let entries = match std::fs::read_dir(&self.state_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let id = ContainerId::new(entry.file_name().to_string_lossy().into_owned());
            let container = Container::load(&self.state_dir, id.clone())?;
            self.restore_container(id, container)?;
        }
        info!(containers = self.registry.len(), "state restored");
        Ok(())
    }

    fn restore_container(
        &mut self,
        id: ContainerId,
        mut container: Container,
    ) -> Result<(), SupervisorError> {
        match container.oom_cgroup_dir() {
            Ok(cgroup_dir) => {
                if let Err(e) = self.monitor.watch_oom(id.clone(), &cgroup_dir) {
                    warn!(container = %id, error = %e, "oom watch not restored");
                }
            }
            // A container whose init is gone has exited; its synthesized
            // exit below handles cleanup.
            Err(SupervisorError::ContainerExited) => {}
            Err(e) => warn!(container = %id, error = %e, "cgroup resolution failed"),
        }

        let process_ids: Vec<ProcessId> = container.processes().map(|p| p.id().clone()).collect();
        let mut exited: Vec<ProcessId> = Vec::new();
        for process_id in process_ids {
            let alive = container
                .process(&process_id)
                .map(|p| p.alive())
                .unwrap_or(false);
            if alive {
                if let Some(process) = container.process_mut(&process_id) {
                    let fd = process.take_exit_pipe()?;
                    self.monitor.watch_exit(id.clone(), process_id.clone(), fd)?;
                }
                debug!(container = %id, process = %process_id, "exit watch restored");
            } else {
                exited.push(process_id);
            }
        }

        // The kernel delivers init's exit last under normal shutdown;
        // mirror that so the delete runs after the exec exits.
        exited.sort_by_key(|process_id| process_id.is_init());
        for process_id in exited {
            self.enqueue(Task::Exit(ExitTask { id: id.clone(), process_id }));
        }

        self.registry.insert(id, Slot::Ready(Box::new(container)));
        Ok(())
    }
}
