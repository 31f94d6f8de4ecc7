// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Non-Linux stub: every operation fails with a well-defined error.
//!
//! The supervisor core is Linux-specific in its use of epoll, eventfd, and
//! memory-cgroup files; other platforms get a monitor that can be
//! constructed (so the daemon type-checks) but never watches anything.

use std::os::fd::OwnedFd;
use std::path::Path;

use sv_core::{ContainerId, ProcessId};
use tokio::sync::mpsc;

use crate::{ExitNotice, MonitorError, OomNotice};

#[derive(Clone)]
pub struct Monitor;

impl Monitor {
    pub fn new() -> Result<
        (Self, mpsc::Receiver<ExitNotice>, mpsc::Receiver<OomNotice>),
        MonitorError,
    > {
        let (_exits_tx, exits_rx) = mpsc::channel(1);
        let (_ooms_tx, ooms_rx) = mpsc::channel(1);
        Ok((Self, exits_rx, ooms_rx))
    }

    pub fn watch_exit(
        &self,
        _container_id: ContainerId,
        _process_id: ProcessId,
        _fd: OwnedFd,
    ) -> Result<(), MonitorError> {
        Err(MonitorError::NotImplemented)
    }

    pub fn watch_oom(
        &self,
        _container_id: ContainerId,
        _cgroup_dir: &Path,
    ) -> Result<(), MonitorError> {
        Err(MonitorError::NotImplemented)
    }

    pub fn close(&self) {}
}
