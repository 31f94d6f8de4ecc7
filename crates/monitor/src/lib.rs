// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sv-monitor: kernel FD readiness translated into lifecycle notices
//!
//! One monitoring thread waits on a level-triggered epoll set holding
//! exit-FIFO read ends and memory-cgroup OOM eventfds, and emits one typed
//! notice per ready descriptor on a pair of bounded channels.

use sv_core::{ContainerId, ProcessId, SupervisorError};
use thiserror::Error;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::Monitor;

#[cfg(not(target_os = "linux"))]
mod stub;
#[cfg(not(target_os = "linux"))]
pub use stub::Monitor;

/// A watched process's exit FIFO became readable: the shim closed its write
/// end, so the process is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitNotice {
    pub container_id: ContainerId,
    pub process_id: ProcessId,
}

/// The kernel OOM killer fired in a watched container's memory cgroup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OomNotice {
    pub container_id: ContainerId,
}

/// Monitor errors
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("monitor not implemented on this platform")]
    NotImplemented,

    #[error("monitor closed")]
    Closed,

    #[error("monitor io: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MonitorError> for SupervisorError {
    fn from(err: MonitorError) -> Self {
        match err {
            MonitorError::NotImplemented => SupervisorError::NotImplemented,
            MonitorError::Closed => {
                SupervisorError::Io(std::io::Error::other("monitor closed"))
            }
            MonitorError::Io(e) => SupervisorError::Io(e),
        }
    }
}
