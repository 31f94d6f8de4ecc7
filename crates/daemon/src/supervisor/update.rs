// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container updates: target state changes and resource limits

use sv_core::{Clock, ContainerId, Event, Resource, SupervisorError};

use crate::task::UpdateContainerTask;

use super::{reply, Supervisor};

impl<C: Clock> Supervisor<C> {
    pub(super) async fn handle_update_container(&mut self, t: UpdateContainerTask) {
        let result = self
            .update_container(&t.id, t.state.as_deref(), t.resources.as_ref())
            .await;
        reply(t.reply, result);
    }

    /// Two disjoint payloads: a target state (`paused` / `running`) or a
    /// resources document. Carrying both is rejected outright rather than
    /// silently dropping the resources.
    async fn update_container(
        &mut self,
        id: &ContainerId,
        state: Option<&str>,
        resources: Option<&Resource>,
    ) -> Result<(), SupervisorError> {
        match (state, resources) {
            (Some(_), Some(_)) => Err(SupervisorError::AmbiguousUpdate),
            (Some(state), None) => {
                let container = self.ready(id)?;
                match state {
                    "paused" => {
                        container.pause().await?;
                        self.publish(Event::pause(id.clone(), 0));
                        Ok(())
                    }
                    "running" => {
                        container.resume().await?;
                        self.publish(Event::resume(id.clone(), 0));
                        Ok(())
                    }
                    other => Err(SupervisorError::UnknownContainerStatus(other.to_string())),
                }
            }
            (None, Some(resources)) => {
                self.ready(id)?.update_resources(resources).await
            }
            (None, None) => Ok(()),
        }
    }
}
