// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-scoped handlers: exec, signal, control-pipe commands

use sv_core::{Clock, ContainerId, ProcessId, SupervisorError};
use sv_runtime::{ProcessSpec, Stdio};

use crate::task::{AddProcessTask, SignalTask, UpdateProcessTask};

use super::{reply, Supervisor};

impl<C: Clock> Supervisor<C> {
    /// Start an additional process inside a running container. Exec starts
    /// are not broadcast as events; only their exits are.
    pub(super) async fn handle_add_process(&mut self, t: AddProcessTask) {
        let result = self
            .add_process(&t.id, t.process_id, t.spec, t.stdio.clone())
            .await
            .map(|()| t.stdio);
        reply(t.reply, result);
    }

    async fn add_process(
        &mut self,
        id: &ContainerId,
        process_id: ProcessId,
        spec: ProcessSpec,
        stdio: Stdio,
    ) -> Result<(), SupervisorError> {
        let monitor = self.monitor.clone();
        let container = self.ready_mut(id)?;
        container.exec(process_id.clone(), spec, stdio).await?;
        let process = container
            .process_mut(&process_id)
            .ok_or(SupervisorError::ProcessNotFound)?;
        let fd = process.take_exit_pipe()?;
        monitor.watch_exit(id.clone(), process_id, fd)?;
        Ok(())
    }

    pub(super) fn handle_signal(&mut self, t: SignalTask) {
        let result = self
            .ready(&t.id)
            .and_then(|container| container.signal(&t.process_id, t.signal));
        reply(t.reply, result);
    }

    /// Write control frames to the shim: close-stdin, resize, or both in
    /// one task.
    pub(super) fn handle_update_process(&mut self, t: UpdateProcessTask) {
        let result = self.update_process(&t);
        reply(t.reply, result);
    }

    fn update_process(&mut self, t: &UpdateProcessTask) -> Result<(), SupervisorError> {
        let container = self.ready_mut(&t.id)?;
        let process = container
            .process_mut(&t.process_id)
            .ok_or(SupervisorError::ProcessNotFound)?;
        if t.close_stdin {
            process.close_stdin()?;
        }
        if let Some((width, height)) = t.resize {
            process.resize(width, height)?;
        }
        Ok(())
    }
}
