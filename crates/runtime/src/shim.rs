// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shim lifecycle: spawn, wait-for-pid, failure extraction
//!
//! The shim is the partial-failure surface of the whole system. Its
//! lifecycle here is spawn → pid-file awaited → running, with three
//! exceptional exits: shim died (error extracted from its log), timeout
//! expired (shim killed, reaped), or the pid file never carried an error
//! source (container-not-started).

use std::path::Path;
use std::process::Stdio as ProcessStdio;
use std::time::Duration;

use serde::Deserialize;
use sv_core::{ContainerId, SupervisorError};
use tokio::process::{Child, Command};
use tracing::debug;

use crate::process::{PID_FILE, RUNTIME_LOG_FILE, SHIM_LOG_FILE};

/// Interval between checks of the shim's pid file.
const PID_POLL_INTERVAL: Duration = Duration::from_millis(15);

/// One structured log line written by the shim or the OCI runtime:
/// `{"level":"error","msg":"..."}`, one JSON object per line.
#[derive(Debug, Clone, Deserialize)]
pub struct ShimLog {
    pub level: String,
    pub msg: String,
}

/// Spawn the shim for a process and wait, bounded by `timeout`, for it to
/// report a system pid.
///
/// The shim runs in its own process group (it must survive a Ctrl-C
/// delivered to the supervisor's terminal) with cwd = the process state
/// directory and argv `<container-id> <bundle> <runtime>`.
pub(crate) async fn start_shim(
    shim: &str,
    container_id: &ContainerId,
    bundle: &Path,
    runtime: &str,
    process_root: &Path,
    timeout: Duration,
) -> Result<(Child, i32), SupervisorError> {
    let mut child = Command::new(shim)
        .arg(container_id.as_str())
        .arg(bundle)
        .arg(runtime)
        .current_dir(process_root)
        .process_group(0)
        .stdin(ProcessStdio::null())
        .stdout(ProcessStdio::null())
        .stderr(ProcessStdio::null())
        .spawn()?;

    let pid_file = process_root.join(PID_FILE);
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(contents) = tokio::fs::read_to_string(&pid_file).await {
            match contents.trim().parse::<i32>() {
                Ok(pid) => {
                    debug!(container = %container_id, pid, "shim reported started");
                    return Ok((child, pid));
                }
                // Exists but not yet fully written; keep polling.
                Err(_) => {}
            }
        }
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(container = %container_id, ?status, "shim died before writing pid");
                return Err(extract_start_error(process_root));
            }
            Ok(None) => {}
            Err(e) => return Err(e.into()),
        }
        if tokio::time::Instant::now() >= deadline {
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(SupervisorError::StartTimeout);
        }
        tokio::time::sleep(PID_POLL_INTERVAL).await;
    }
}

/// Surface the exact underlying error after a shim death: the first
/// error-level line of the shim log wins, then the runtime log, then the
/// generic container-not-started.
pub(crate) fn extract_start_error(process_root: &Path) -> SupervisorError {
    if let Some(msg) = first_error_line(&process_root.join(SHIM_LOG_FILE)) {
        return SupervisorError::Shim(msg);
    }
    if let Some(msg) = first_error_line(&process_root.join(RUNTIME_LOG_FILE)) {
        return SupervisorError::OciRuntime(msg);
    }
    SupervisorError::ContainerNotStarted
}

fn first_error_line(path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(path).ok()?;
    contents
        .lines()
        .filter_map(|line| serde_json::from_str::<ShimLog>(line).ok())
        .find(|entry| entry.level == "error")
        .map(|entry| entry.msg)
}

#[cfg(test)]
#[path = "shim_tests.rs"]
mod tests;
