// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor error taxonomy
//!
//! Every failure surfaced to a task producer maps to one of these kinds.
//! Display strings are stable: clients match on them across daemon versions.

use thiserror::Error;

/// Errors surfaced by the supervisor and its collaborators.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("container not found")]
    ContainerNotFound,

    #[error("process not found")]
    ProcessNotFound,

    #[error("container already exists")]
    ContainerExists,

    #[error("container has exited")]
    ContainerExited,

    #[error("container not started")]
    ContainerNotStarted,

    #[error("container did not start before the specified timeout")]
    StartTimeout,

    /// First error line from the shim's structured log.
    #[error("shim error: {0}")]
    Shim(String),

    /// Combined output or structured log error from the OCI runtime binary.
    #[error("oci runtime error: {0}")]
    OciRuntime(String),

    #[error("invalid container type {0:?}")]
    InvalidContainerType(String),

    #[error("terminals are not supported for process {0:?}")]
    TerminalsNotSupported(String),

    #[error("checkpoint already exists")]
    CheckpointExists,

    #[error("checkpoint does not exist")]
    CheckpointNotExists,

    #[error("unknown container status {0:?}")]
    UnknownContainerStatus(String),

    #[error("unknown task type {0:?}")]
    UnknownTask(String),

    /// An update task set both a target state and resources.
    #[error("update sets both state and resources")]
    AmbiguousUpdate,

    #[error("not implemented on this platform")]
    NotImplemented,

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl SupervisorError {
    /// True for lookup misses that callers commonly tolerate.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ContainerNotFound | Self::ProcessNotFound)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
