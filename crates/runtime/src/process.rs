// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-process state: stdio FIFOs, exit pipe, control pipe, system pid
//!
//! A process object exclusively owns its FIFO paths and removes them with
//! its directory. The exit pipe's read end is handed to the monitor (which
//! closes it after the hangup); the control pipe's write end stays here.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::fd::OwnedFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::fcntl::OFlag;
use nix::sys::signal::{kill, Signal};
use nix::sys::stat::Mode;
use nix::unistd::Pid;
use sv_core::{ContainerId, ProcessId, SupervisorError};
use tokio::process::Child;
use tracing::warn;

use crate::state::{write_json_atomic, ProcessSpec, ProcessState};

/// Sentinel stdio path meaning "unused".
pub const NULL_DEVICE: &str = "/dev/null";

/// Exit status reported when the real one cannot be determined.
pub const UNKNOWN_STATUS: u32 = 255;

pub(crate) const PID_FILE: &str = "pid";
pub(crate) const EXIT_FIFO: &str = "exit";
pub(crate) const CONTROL_FIFO: &str = "control";
pub(crate) const EXIT_STATUS_FILE: &str = "exitStatus";
pub(crate) const PROCESS_FILE: &str = "process.json";
pub(crate) const SHIM_LOG_FILE: &str = "shim-log.json";
pub(crate) const RUNTIME_LOG_FILE: &str = "log.json";

/// The three stdio FIFO paths handed back to the task producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stdio {
    pub stdin: PathBuf,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

impl Stdio {
    /// All three streams unused.
    pub fn null() -> Self {
        Self {
            stdin: PathBuf::from(NULL_DEVICE),
            stdout: PathBuf::from(NULL_DEVICE),
            stderr: PathBuf::from(NULL_DEVICE),
        }
    }
}

impl Default for Stdio {
    fn default() -> Self {
        Self::null()
    }
}

/// One process inside a container, keyed by a client-chosen id.
#[derive(Debug)]
pub struct Process {
    id: ProcessId,
    container_id: ContainerId,
    root: PathBuf,
    stdio: Stdio,
    spec: ProcessSpec,
    system_pid: Option<i32>,
    exit_pipe: Option<OwnedFd>,
    control_pipe: Option<File>,
    shim: Option<Child>,
}

impl Process {
    /// Create `<root>/`, the exit and control FIFOs inside it, and the
    /// `process.json` snapshot; open both pipe ends the supervisor holds.
    ///
    /// The exit pipe is opened non-blocking so an already-closed peer does
    /// not deadlock the open; the control pipe is opened read-write so the
    /// open succeeds before the shim exists and writes fail fast after it
    /// dies.
    pub(crate) fn create(
        container_id: ContainerId,
        id: ProcessId,
        root: PathBuf,
        stdio: Stdio,
        state: &ProcessState,
    ) -> Result<Self, SupervisorError> {
        std::fs::create_dir(&root)?;
        let mode = Mode::from_bits_truncate(0o600);
        nix::unistd::mkfifo(&root.join(EXIT_FIFO), mode)
            .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
        nix::unistd::mkfifo(&root.join(CONTROL_FIFO), mode)
            .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
        write_json_atomic(&root.join(PROCESS_FILE), state)?;

        let exit_pipe = open_exit_pipe(&root)?;
        let control_pipe = open_control_pipe(&root)?;

        Ok(Self {
            id,
            container_id,
            root,
            stdio,
            spec: state.spec.clone(),
            system_pid: None,
            exit_pipe: Some(exit_pipe),
            control_pipe: Some(control_pipe),
            shim: None,
        })
    }

    /// Rebuild a process from its on-disk directory after a restart.
    ///
    /// A missing or non-integer pid file leaves `system_pid` unset with a
    /// warning; the restore path treats such a process as exited.
    pub(crate) fn load(
        container_id: ContainerId,
        id: ProcessId,
        root: PathBuf,
    ) -> Result<Self, SupervisorError> {
        let state: ProcessState = crate::state::read_json(&root.join(PROCESS_FILE))?;
        let system_pid = match std::fs::read_to_string(root.join(PID_FILE)) {
            Ok(s) => match s.trim().parse::<i32>() {
                Ok(pid) => Some(pid),
                Err(_) => {
                    warn!(container = %container_id, process = %id, "pid file is not an integer");
                    None
                }
            },
            Err(e) => {
                warn!(container = %container_id, process = %id, error = %e, "pid file unreadable");
                None
            }
        };
        Ok(Self {
            id,
            container_id,
            root,
            stdio: Stdio {
                stdin: state.stdin.clone(),
                stdout: state.stdout.clone(),
                stderr: state.stderr.clone(),
            },
            spec: state.spec,
            system_pid,
            exit_pipe: None,
            control_pipe: None,
            shim: None,
        })
    }

    pub fn id(&self) -> &ProcessId {
        &self.id
    }

    pub fn container_id(&self) -> &ContainerId {
        &self.container_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stdio(&self) -> &Stdio {
        &self.stdio
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    pub fn system_pid(&self) -> Option<i32> {
        self.system_pid
    }

    pub(crate) fn set_system_pid(&mut self, pid: i32) {
        self.system_pid = Some(pid);
    }

    pub(crate) fn set_shim(&mut self, child: Child) {
        self.shim = Some(child);
    }

    /// Hand out the shim child handle for reaping.
    pub fn take_shim(&mut self) -> Option<Child> {
        self.shim.take()
    }

    /// Take the exit-FIFO read end for monitor registration, reopening it
    /// after a restart.
    pub fn take_exit_pipe(&mut self) -> Result<OwnedFd, SupervisorError> {
        match self.exit_pipe.take() {
            Some(fd) => Ok(fd),
            None => open_exit_pipe(&self.root),
        }
    }

    /// True when the recorded system pid still responds to signal 0.
    pub fn alive(&self) -> bool {
        match self.system_pid {
            // EPERM means the pid exists but belongs to someone else now;
            // only ESRCH proves death.
            Some(pid) => !matches!(kill(Pid::from_raw(pid), None), Err(nix::errno::Errno::ESRCH)),
            None => false,
        }
    }

    /// Deliver `signum` to the recorded system pid.
    pub fn signal(&self, signum: i32) -> Result<(), SupervisorError> {
        let pid = self.system_pid.ok_or(SupervisorError::ProcessNotFound)?;
        let signal = Signal::try_from(signum).map_err(|_| {
            SupervisorError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid signal {signum}"),
            ))
        })?;
        match kill(Pid::from_raw(pid), signal) {
            Ok(()) => Ok(()),
            Err(nix::errno::Errno::ESRCH) => Err(SupervisorError::ProcessNotFound),
            Err(e) => Err(SupervisorError::Io(std::io::Error::from_raw_os_error(e as i32))),
        }
    }

    /// Ask the shim to resize the process's terminal.
    pub fn resize(&mut self, width: u16, height: u16) -> Result<(), SupervisorError> {
        if !self.spec.terminal {
            return Err(SupervisorError::TerminalsNotSupported(self.id.to_string()));
        }
        self.control_write(&format!("1 {width} {height}\n"))
    }

    /// Ask the shim to close the process's stdin.
    pub fn close_stdin(&mut self) -> Result<(), SupervisorError> {
        self.control_write("0 0 0\n")
    }

    fn control_write(&mut self, frame: &str) -> Result<(), SupervisorError> {
        if self.control_pipe.is_none() {
            self.control_pipe = Some(open_control_pipe(&self.root)?);
        }
        if let Some(pipe) = self.control_pipe.as_mut() {
            pipe.write_all(frame.as_bytes())?;
        }
        Ok(())
    }

    /// Exit status the shim recorded, or [`UNKNOWN_STATUS`] when missing.
    pub fn exit_status(&self) -> u32 {
        std::fs::read_to_string(self.root.join(EXIT_STATUS_FILE))
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
            .unwrap_or(UNKNOWN_STATUS)
    }

    /// Remove the on-disk process directory, FIFOs included.
    pub fn remove(&self) -> std::io::Result<()> {
        std::fs::remove_dir_all(&self.root)
    }
}

fn open_exit_pipe(root: &Path) -> Result<OwnedFd, SupervisorError> {
    let file = OpenOptions::new()
        .read(true)
        .custom_flags(OFlag::O_NONBLOCK.bits())
        .open(root.join(EXIT_FIFO))?;
    Ok(file.into())
}

fn open_control_pipe(root: &Path) -> Result<File, SupervisorError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(OFlag::O_NONBLOCK.bits())
        .open(root.join(CONTROL_FIFO))?;
    Ok(file)
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
