// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container model and OCI runtime operations
//!
//! All methods are called from the supervisor loop except `start`/`exec`,
//! which the loop delegates to workers so it never blocks on a spawn.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sv_core::{Checkpoint, ContainerId, ProcessId, Resource, SupervisorError};
use tracing::warn;

use crate::driver::OciDriver;
use crate::process::{Process, Stdio};
use crate::shim::start_shim;
use crate::state::{read_json, write_json_atomic, ProcessSpec, ProcessState, StateFile};
use crate::stats::{Stat, StatsEnvelope};

const STATE_FILE: &str = "state.json";
const CHECKPOINT_CONFIG: &str = "config.json";

/// Inputs for [`Container::create`].
#[derive(Debug, Clone)]
pub struct ContainerOpts {
    pub id: ContainerId,
    /// Absolute path of the OCI bundle (contains `config.json`).
    pub bundle: PathBuf,
    /// Path or basename of the OCI runtime binary.
    pub runtime: String,
    /// Free-form prefix args for every runtime invocation.
    pub runtime_args: Vec<String>,
    /// Path or basename of the shim binary.
    pub shim: String,
    /// Opaque labels supplied at creation; persisted.
    pub labels: Vec<String>,
    pub no_pivot_root: bool,
    /// Bounded time to wait for the shim to report started.
    pub timeout: Duration,
}

/// Runtime-reported container status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Created,
    Running,
    Pausing,
    Paused,
    Stopped,
}

impl FromStr for Status {
    type Err = SupervisorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Status::Created),
            "running" => Ok(Status::Running),
            "pausing" => Ok(Status::Pausing),
            "paused" => Ok(Status::Paused),
            "stopped" => Ok(Status::Stopped),
            other => Err(SupervisorError::UnknownContainerStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Created => "created",
            Status::Running => "running",
            Status::Pausing => "pausing",
            Status::Paused => "paused",
            Status::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// The bundle's `config.json`; only the process section is needed here.
#[derive(Debug, Deserialize)]
struct BundleConfig {
    process: ProcessSpec,
}

/// One container: on-disk state plus the in-memory process map. Mutated
/// only from the supervisor loop.
#[derive(Debug)]
pub struct Container {
    id: ContainerId,
    /// `<state-dir>/<id>`
    dir: PathBuf,
    bundle: PathBuf,
    runtime: String,
    runtime_args: Vec<String>,
    shim: String,
    labels: Vec<String>,
    no_pivot_root: bool,
    timeout: Duration,
    driver: OciDriver,
    processes: HashMap<ProcessId, Process>,
}

impl Container {
    /// Create `<state-dir>/<id>/` and persist `state.json` before the
    /// container is returned to the caller. Fails with container-exists
    /// when the directory is already present.
    pub fn create(state_dir: &Path, opts: ContainerOpts) -> Result<Self, SupervisorError> {
        std::fs::create_dir_all(state_dir)?;
        let dir = state_dir.join(opts.id.as_str());
        if let Err(e) = std::fs::create_dir(&dir) {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                return Err(SupervisorError::ContainerExists);
            }
            return Err(e.into());
        }
        let state = StateFile {
            bundle: opts.bundle.clone(),
            labels: opts.labels.clone(),
            runtime: opts.runtime.clone(),
            runtime_args: opts.runtime_args.clone(),
            shim: opts.shim.clone(),
            no_pivot_root: opts.no_pivot_root,
            timeout_ms: opts.timeout.as_millis() as u64,
        };
        write_json_atomic(&dir.join(STATE_FILE), &state)?;

        let driver = OciDriver::new(opts.runtime.clone(), opts.runtime_args.clone());
        Ok(Self {
            id: opts.id,
            dir,
            bundle: opts.bundle,
            runtime: opts.runtime,
            runtime_args: opts.runtime_args,
            shim: opts.shim,
            labels: opts.labels,
            no_pivot_root: opts.no_pivot_root,
            timeout: opts.timeout,
            driver,
            processes: HashMap::new(),
        })
    }

    /// Rebuild a container and its processes from `<state-dir>/<id>/`.
    pub fn load(state_dir: &Path, id: ContainerId) -> Result<Self, SupervisorError> {
        let dir = state_dir.join(id.as_str());
        let state: StateFile = read_json(&dir.join(STATE_FILE))?;
        let driver = OciDriver::new(state.runtime.clone(), state.runtime_args.clone());
        let mut container = Self {
            id,
            dir: dir.clone(),
            bundle: state.bundle,
            runtime: state.runtime,
            runtime_args: state.runtime_args,
            shim: state.shim,
            labels: state.labels,
            no_pivot_root: state.no_pivot_root,
            timeout: Duration::from_millis(state.timeout_ms),
            driver,
            processes: HashMap::new(),
        };
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let process_id = ProcessId::new(name);
            let process =
                Process::load(container.id.clone(), process_id.clone(), entry.path())?;
            container.processes.insert(process_id, process);
        }
        Ok(container)
    }

    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn bundle(&self) -> &Path {
        &self.bundle
    }

    pub fn runtime(&self) -> &str {
        &self.runtime
    }

    pub fn runtime_args(&self) -> &[String] {
        &self.runtime_args
    }

    pub fn shim(&self) -> &str {
        &self.shim
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn no_pivot_root(&self) -> bool {
        self.no_pivot_root
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start the container's primary process, optionally restoring from a
    /// named checkpoint. The init process spec comes from the bundle's
    /// `config.json`.
    pub async fn start(
        &mut self,
        checkpoint: Option<&str>,
        stdio: Stdio,
    ) -> Result<&Process, SupervisorError> {
        let config: BundleConfig = read_json(&self.bundle.join("config.json"))?;
        let (root_uid, root_gid) = config
            .process
            .user
            .as_ref()
            .map(|u| (u.uid, u.gid))
            .unwrap_or((0, 0));
        let state = ProcessState {
            spec: config.process,
            exec: false,
            stdin: stdio.stdin.clone(),
            stdout: stdio.stdout.clone(),
            stderr: stdio.stderr.clone(),
            runtime_args: self.runtime_args.clone(),
            no_pivot_root: self.no_pivot_root,
            checkpoint: checkpoint.unwrap_or_default().to_string(),
            root_uid,
            root_gid,
        };
        self.start_process(ProcessId::init(), state, stdio).await
    }

    /// Start an additional process with a client-provided id and spec. The
    /// `init` key is reserved; a colliding id fails when its directory is
    /// created.
    pub async fn exec(
        &mut self,
        process_id: ProcessId,
        spec: ProcessSpec,
        stdio: Stdio,
    ) -> Result<&Process, SupervisorError> {
        let (root_uid, root_gid) =
            spec.user.as_ref().map(|u| (u.uid, u.gid)).unwrap_or((0, 0));
        let state = ProcessState {
            spec,
            exec: true,
            stdin: stdio.stdin.clone(),
            stdout: stdio.stdout.clone(),
            stderr: stdio.stderr.clone(),
            runtime_args: self.runtime_args.clone(),
            no_pivot_root: self.no_pivot_root,
            checkpoint: String::new(),
            root_uid,
            root_gid,
        };
        self.start_process(process_id, state, stdio).await
    }

    /// Shared spawn path: lay out the process directory, start the shim,
    /// and wait for the pid file. Any failure after the directory was
    /// created removes it again.
    async fn start_process(
        &mut self,
        process_id: ProcessId,
        state: ProcessState,
        stdio: Stdio,
    ) -> Result<&Process, SupervisorError> {
        let root = self.dir.join(process_id.as_str());
        let mut process = Process::create(
            self.id.clone(),
            process_id.clone(),
            root.clone(),
            stdio,
            &state,
        )?;
        match start_shim(
            &self.shim,
            &self.id,
            &self.bundle,
            &self.runtime,
            &root,
            self.timeout,
        )
        .await
        {
            Ok((child, pid)) => {
                process.set_system_pid(pid);
                process.set_shim(child);
                Ok(self.processes.entry(process_id).or_insert(process))
            }
            Err(e) => {
                if let Err(cleanup) = process.remove() {
                    warn!(container = %self.id, process = %process_id, error = %cleanup, "failed to remove process dir after start failure");
                }
                Err(e)
            }
        }
    }

    /// Remove `<state-dir>/<id>/`, then invoke the runtime's `delete`. The
    /// first error encountered is returned but both cleanups run. The
    /// in-memory process map is left alone so the caller can still reap
    /// shim handles.
    pub async fn delete(&mut self) -> Result<(), SupervisorError> {
        let dir_result = std::fs::remove_dir_all(&self.dir);
        let runtime_result = self.driver.run(&["delete", self.id.as_str()], None).await;
        dir_result.map_err(SupervisorError::from)?;
        runtime_result.map(|_| ())
    }

    pub async fn pause(&self) -> Result<(), SupervisorError> {
        self.driver.run(&["pause", self.id.as_str()], None).await.map(|_| ())
    }

    pub async fn resume(&self) -> Result<(), SupervisorError> {
        self.driver.run(&["resume", self.id.as_str()], None).await.map(|_| ())
    }

    /// Deliver `signum` to the process with id `process_id`.
    pub fn signal(&self, process_id: &ProcessId, signum: i32) -> Result<(), SupervisorError> {
        self.processes
            .get(process_id)
            .ok_or(SupervisorError::ProcessNotFound)?
            .signal(signum)
    }

    /// Take a named snapshot of the running container.
    pub async fn checkpoint(&self, cpt: &Checkpoint) -> Result<(), SupervisorError> {
        let checkpoints = self.bundle.join("checkpoints");
        std::fs::create_dir_all(&checkpoints)?;
        let dir = checkpoints.join(&cpt.name);
        if let Err(e) = std::fs::create_dir(&dir) {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                return Err(SupervisorError::CheckpointExists);
            }
            return Err(e.into());
        }
        write_json_atomic(&dir.join(CHECKPOINT_CONFIG), cpt)?;

        let image_path = dir.to_string_lossy().into_owned();
        let mut argv = vec!["checkpoint", "--image-path", image_path.as_str()];
        if !cpt.exit {
            argv.push("--leave-running");
        }
        if cpt.shell {
            argv.push("--shell-job");
        }
        if cpt.tcp {
            argv.push("--tcp-established");
        }
        if cpt.unix_sockets {
            argv.push("--ext-unix-sk");
        }
        argv.push(self.id.as_str());
        self.driver.run(&argv, None).await.map(|_| ())
    }

    /// List stored checkpoints in directory-scan order.
    pub fn checkpoints(&self) -> Result<Vec<Checkpoint>, SupervisorError> {
        let dir = self.bundle.join("checkpoints");
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut checkpoints = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            checkpoints.push(read_json(&entry.path().join(CHECKPOINT_CONFIG))?);
        }
        Ok(checkpoints)
    }

    pub fn delete_checkpoint(&self, name: &str) -> Result<(), SupervisorError> {
        let dir = self.bundle.join("checkpoints").join(name);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SupervisorError::CheckpointNotExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Snapshot of the current process map values; ordering undefined.
    pub fn processes(&self) -> impl Iterator<Item = &Process> {
        self.processes.values()
    }

    pub fn process(&self, id: &ProcessId) -> Option<&Process> {
        self.processes.get(id)
    }

    pub fn process_mut(&mut self, id: &ProcessId) -> Option<&mut Process> {
        self.processes.get_mut(id)
    }

    pub fn remove_process(&mut self, id: &ProcessId) -> Option<Process> {
        self.processes.remove(id)
    }

    /// System pids inside the container, per the runtime's `ps`.
    pub async fn pids(&self) -> Result<Vec<i32>, SupervisorError> {
        self.driver
            .run_json(&["ps", "--format=json", self.id.as_str()], None)
            .await
    }

    /// One stats sample, stamped with the caller's wall clock.
    pub async fn stats(&self, timestamp: u64) -> Result<Stat, SupervisorError> {
        let envelope: StatsEnvelope = self
            .driver
            .run_json(&["events", "--stats", self.id.as_str()], None)
            .await?;
        Ok(Stat { timestamp, data: envelope.data })
    }

    /// Runtime-reported status.
    pub async fn status(&self) -> Result<Status, SupervisorError> {
        #[derive(Deserialize)]
        struct StateEnvelope {
            status: String,
        }
        let envelope: StateEnvelope =
            self.driver.run_json(&["state", self.id.as_str()], None).await?;
        envelope.status.parse()
    }

    /// Pipe an OCI resources document to `update -r -`.
    pub async fn update_resources(&self, resource: &Resource) -> Result<(), SupervisorError> {
        let doc = RuntimeResources::from(resource);
        let input = serde_json::to_vec(&doc)?;
        self.driver
            .run_with_stdin(&["update", "-r", "-", self.id.as_str()], &input)
            .await
            .map(|_| ())
    }

    /// Absolute directory of the init process's memory cgroup, for OOM
    /// watch registration. A container without a live init has exited.
    pub fn oom_cgroup_dir(&self) -> Result<PathBuf, SupervisorError> {
        let init = self
            .processes
            .get(ProcessId::INIT)
            .ok_or(SupervisorError::ContainerExited)?;
        let pid = init.system_pid().ok_or(SupervisorError::ContainerExited)?;
        crate::cgroup::memory_cgroup_dir(pid)
    }
}

/// OCI resources document accepted by `<runtime> update -r -`.
#[derive(Debug, Default, Serialize)]
struct RuntimeResources {
    #[serde(skip_serializing_if = "Option::is_none")]
    memory: Option<MemoryLimits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cpu: Option<CpuLimits>,
    #[serde(rename = "blockIO", skip_serializing_if = "Option::is_none")]
    block_io: Option<BlockIo>,
}

#[derive(Debug, Default, Serialize)]
struct MemoryLimits {
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reservation: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    swap: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kernel: Option<i64>,
    #[serde(rename = "kernelTCP", skip_serializing_if = "Option::is_none")]
    kernel_tcp: Option<i64>,
}

#[derive(Debug, Default, Serialize)]
struct CpuLimits {
    #[serde(skip_serializing_if = "Option::is_none")]
    shares: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quota: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    period: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cpus: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mems: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct BlockIo {
    #[serde(skip_serializing_if = "Option::is_none")]
    weight: Option<u16>,
}

impl From<&Resource> for RuntimeResources {
    fn from(r: &Resource) -> Self {
        let memory = if r.memory_limit.is_some()
            || r.memory_reservation.is_some()
            || r.memory_swap.is_some()
            || r.kernel_memory.is_some()
            || r.kernel_tcp_memory.is_some()
        {
            Some(MemoryLimits {
                limit: r.memory_limit,
                reservation: r.memory_reservation,
                swap: r.memory_swap,
                kernel: r.kernel_memory,
                kernel_tcp: r.kernel_tcp_memory,
            })
        } else {
            None
        };
        let cpu = if r.cpu_shares.is_some()
            || r.cpu_quota.is_some()
            || r.cpu_period.is_some()
            || r.cpuset_cpus.is_some()
            || r.cpuset_mems.is_some()
        {
            Some(CpuLimits {
                shares: r.cpu_shares,
                quota: r.cpu_quota,
                period: r.cpu_period,
                cpus: r.cpuset_cpus.clone(),
                mems: r.cpuset_mems.clone(),
            })
        } else {
            None
        };
        let block_io = r.blkio_weight.map(|weight| BlockIo { weight: Some(weight) });
        Self { memory, cpu, block_io }
    }
}

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;
