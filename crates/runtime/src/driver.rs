// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OCI runtime binary driver
//!
//! Invokes `<runtime> [args...] <verb> [verb-flags] <container-id>` and
//! captures combined stdout+stderr. A non-zero exit surfaces that text as
//! the error; nothing is retried here — retry policy belongs to callers,
//! and there is none for these operations.

use std::path::Path;
use std::process::Stdio;

use serde::de::DeserializeOwned;
use sv_core::SupervisorError;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// One container's view of its OCI runtime: the binary name plus the
/// free-form prefix args (e.g. `--root=`) supplied at creation, kept
/// verbatim so every later invocation sees the same root.
#[derive(Debug, Clone)]
pub struct OciDriver {
    binary: String,
    args: Vec<String>,
}

impl OciDriver {
    pub fn new(binary: impl Into<String>, args: Vec<String>) -> Self {
        Self { binary: binary.into(), args }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn command(&self, argv: &[&str], cwd: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.args)
            .args(argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Run a verb to completion and return its combined output.
    pub async fn run(&self, argv: &[&str], cwd: Option<&Path>) -> Result<String, SupervisorError> {
        debug!(binary = %self.binary, argv = ?argv, "invoking oci runtime");
        let output = self.command(argv, cwd).output().await?;
        let combined = combine(&output.stdout, &output.stderr);
        if !output.status.success() {
            return Err(SupervisorError::OciRuntime(combined));
        }
        Ok(combined)
    }

    /// Run a verb whose stdout is a JSON document.
    pub async fn run_json<T: DeserializeOwned>(
        &self,
        argv: &[&str],
        cwd: Option<&Path>,
    ) -> Result<T, SupervisorError> {
        debug!(binary = %self.binary, argv = ?argv, "invoking oci runtime (json)");
        let output = self.command(argv, cwd).output().await?;
        if !output.status.success() {
            return Err(SupervisorError::OciRuntime(combine(&output.stdout, &output.stderr)));
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }

    /// Run a verb feeding `input` on its stdin (used by `update -r -`).
    pub async fn run_with_stdin(
        &self,
        argv: &[&str],
        input: &[u8],
    ) -> Result<String, SupervisorError> {
        debug!(binary = %self.binary, argv = ?argv, "invoking oci runtime (stdin)");
        let mut cmd = self.command(argv, None);
        cmd.stdin(Stdio::piped());
        let mut child = cmd.spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input).await?;
            // Close stdin so the runtime sees EOF.
            drop(stdin);
        }
        let output = child.wait_with_output().await?;
        let combined = combine(&output.stdout, &output.stderr);
        if !output.status.success() {
            return Err(SupervisorError::OciRuntime(combined));
        }
        Ok(combined)
    }
}

fn combine(stdout: &[u8], stderr: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(stdout).into_owned();
    let err = String::from_utf8_lossy(stderr);
    if !err.is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&err);
    }
    text.trim().to_string()
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
