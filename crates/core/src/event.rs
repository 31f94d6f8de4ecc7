// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle events, broadcast to subscribers and journaled to disk
//!
//! Serialized as one JSON object per journal line:
//! `{"id":...,"type":...,"timestamp":...,"pid":...,"status":...}` with
//! `pid` and `status` omitted when zero-valued.

use crate::id::ContainerId;
use serde::{Deserialize, Serialize};

/// Externally-observable lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Container the event belongs to.
    pub id: ContainerId,
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Wall-clock time in epoch milliseconds. Well-ordered within a journal.
    pub timestamp: u64,
    /// Process id within the container, for process-scoped events.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pid: String,
    /// Exit status, for exit events.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub status: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// The closed set of event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "start-container")]
    StartContainer,
    #[serde(rename = "exit")]
    Exit,
    #[serde(rename = "pause")]
    Pause,
    #[serde(rename = "resume")]
    Resume,
    #[serde(rename = "start-process")]
    StartProcess,
    #[serde(rename = "oom")]
    Oom,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::StartContainer => "start-container",
            EventKind::Exit => "exit",
            EventKind::Pause => "pause",
            EventKind::Resume => "resume",
            EventKind::StartProcess => "start-process",
            EventKind::Oom => "oom",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Event {
    /// A container's primary process started.
    pub fn start_container(id: ContainerId, timestamp: u64) -> Self {
        Self { id, kind: EventKind::StartContainer, timestamp, pid: String::new(), status: 0 }
    }

    /// A process exited with `status`.
    pub fn exit(id: ContainerId, pid: impl Into<String>, status: u32, timestamp: u64) -> Self {
        Self { id, kind: EventKind::Exit, timestamp, pid: pid.into(), status }
    }

    pub fn pause(id: ContainerId, timestamp: u64) -> Self {
        Self { id, kind: EventKind::Pause, timestamp, pid: String::new(), status: 0 }
    }

    pub fn resume(id: ContainerId, timestamp: u64) -> Self {
        Self { id, kind: EventKind::Resume, timestamp, pid: String::new(), status: 0 }
    }

    /// An additional process started inside a running container.
    pub fn start_process(id: ContainerId, pid: impl Into<String>, timestamp: u64) -> Self {
        Self { id, kind: EventKind::StartProcess, timestamp, pid: pid.into(), status: 0 }
    }

    /// The kernel's OOM killer fired inside the container's memory cgroup.
    pub fn oom(id: ContainerId, timestamp: u64) -> Self {
        Self { id, kind: EventKind::Oom, timestamp, pid: String::new(), status: 0 }
    }

    /// One-line `key=val` summary for logging.
    pub fn log_summary(&self) -> String {
        let mut s = format!("{} id={}", self.kind, self.id);
        if !self.pid.is_empty() {
            s.push_str(&format!(" pid={}", self.pid));
        }
        if self.status != 0 {
            s.push_str(&format!(" status={}", self.status));
        }
        s
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
