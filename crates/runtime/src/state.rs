// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk state formats
//!
//! `state.json` and `process.json` are the normative boundary with the
//! shim: the shim reads `process.json` from its working directory to learn
//! what to launch, and a restarting supervisor reads both files to rebuild
//! its registry.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sv_core::SupervisorError;

/// Container metadata persisted at `<state-dir>/<id>/state.json`.
///
/// Written atomically before the container is returned to the caller, so a
/// directory with a `state.json` is always loadable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateFile {
    pub bundle: PathBuf,
    #[serde(default)]
    pub labels: Vec<String>,
    pub runtime: String,
    #[serde(default, rename = "runtimeArgs")]
    pub runtime_args: Vec<String>,
    pub shim: String,
    #[serde(default, rename = "noPivotRoot")]
    pub no_pivot_root: bool,
    /// Bounded time to wait for the shim to report started, in milliseconds.
    #[serde(default, rename = "timeoutMs")]
    pub timeout_ms: u64,
}

/// The process fragment of an OCI bundle `config.json`, snapshotted per
/// process for crash recovery and handed to the shim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    #[serde(default)]
    pub terminal: bool,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub cwd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub uid: u32,
    #[serde(default)]
    pub gid: u32,
    #[serde(default, rename = "additionalGids", skip_serializing_if = "Vec::is_empty")]
    pub additional_gids: Vec<u32>,
}

/// Everything the shim needs to launch one process, persisted at
/// `<state-dir>/<id>/<process-id>/process.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessState {
    #[serde(flatten)]
    pub spec: ProcessSpec,
    /// True for processes added with exec, false for init.
    #[serde(default)]
    pub exec: bool,
    pub stdin: PathBuf,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
    #[serde(default, rename = "runtimeArgs")]
    pub runtime_args: Vec<String>,
    #[serde(default, rename = "noPivotRoot")]
    pub no_pivot_root: bool,
    /// Checkpoint name to restore from, empty for a fresh start.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checkpoint: String,
    #[serde(default, rename = "rootUID")]
    pub root_uid: u32,
    #[serde(default, rename = "rootGID")]
    pub root_gid: u32,
}

/// Write `value` as JSON to `path` via a temp file + rename so readers
/// never observe a torn file.
pub(crate) fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), SupervisorError> {
    let tmp = path.with_extension("tmp");
    let data = serde_json::to_vec(value)?;
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

pub(crate) fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, SupervisorError> {
    let data = std::fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
