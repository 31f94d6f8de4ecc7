// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checkpoint metadata

use serde::{Deserialize, Serialize};

/// A named snapshot of a running container, persisted as `config.json`
/// inside `<bundle>/checkpoints/<name>/` next to the runtime's image files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub name: String,
    /// Creation time in epoch milliseconds.
    pub created: u64,
    /// Persist established TCP connections.
    #[serde(default)]
    pub tcp: bool,
    /// Persist external unix sockets.
    #[serde(default)]
    pub unix_sockets: bool,
    /// Persist shell jobs.
    #[serde(default)]
    pub shell: bool,
    /// Stop the container after the checkpoint is taken.
    #[serde(default)]
    pub exit: bool,
}
