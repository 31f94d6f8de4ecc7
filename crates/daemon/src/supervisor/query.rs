// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-side handlers: registry listing, stats, checkpoints

use sv_core::Clock;
use sv_runtime::Container;

use crate::task::{
    ContainerInfo, CreateCheckpointTask, DeleteCheckpointTask, GetContainersTask, StatsTask,
};

use super::{reply, Slot, Supervisor};

fn info(container: &Container) -> ContainerInfo {
    ContainerInfo {
        id: container.id().clone(),
        bundle: container.bundle().to_path_buf(),
        runtime: container.runtime().to_string(),
        labels: container.labels().to_vec(),
        processes: container.processes().map(|p| p.id().clone()).collect(),
    }
}

impl<C: Clock> Supervisor<C> {
    /// Registry snapshot; never invokes the runtime.
    pub(super) fn handle_get_containers(&mut self, t: GetContainersTask) {
        let result = match &t.id {
            Some(id) => self.ready(id).map(|container| vec![info(container)]),
            None => Ok(self
                .registry
                .values()
                .filter_map(|slot| match slot {
                    Slot::Ready(container) => Some(info(container)),
                    Slot::Starting => None,
                })
                .collect()),
        };
        reply(t.reply, result);
    }

    /// One `events --stats` sample, stamped with the current wall clock.
    /// A single bounded runtime invocation, same bucket as pause/resume.
    pub(super) async fn handle_stats(&mut self, t: StatsTask) {
        let now = self.now();
        let result = match self.ready(&t.id) {
            Ok(container) => container.stats(now).await,
            Err(e) => Err(e),
        };
        reply(t.reply, result);
    }

    pub(super) async fn handle_create_checkpoint(&mut self, t: CreateCheckpointTask) {
        let mut checkpoint = t.checkpoint;
        if checkpoint.created == 0 {
            checkpoint.created = self.now();
        }
        let result = match self.ready(&t.id) {
            Ok(container) => container.checkpoint(&checkpoint).await,
            Err(e) => Err(e),
        };
        reply(t.reply, result);
    }

    pub(super) fn handle_delete_checkpoint(&mut self, t: DeleteCheckpointTask) {
        let result = self
            .ready(&t.id)
            .and_then(|container| container.delete_checkpoint(&t.name));
        reply(t.reply, result);
    }
}
