// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Linux monitor built on epoll + eventfd
//!
//! Registrations are mutex-protected because exit watches arrive from the
//! start workers while OOM watches arrive from the supervisor loop. The
//! wait thread never blocks while holding the registry lock; notices are
//! collected under the lock and sent after it is released.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use nix::sys::eventfd::{EfdFlags, EventFd};
use parking_lot::Mutex;
use sv_core::{ContainerId, ProcessId};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::{ExitNotice, MonitorError, OomNotice};

/// Capacity of the notice channels. Kept minimal so backpressure from a
/// saturated supervisor loop parks the monitor thread instead of buffering.
const NOTICE_CAPACITY: usize = 1;

fn errno_io(e: Errno) -> std::io::Error {
    std::io::Error::from_raw_os_error(e as i32)
}

enum Watch {
    Wake,
    Exit {
        container_id: ContainerId,
        process_id: ProcessId,
        fd: OwnedFd,
    },
    Oom(OomWatch),
}

struct OomWatch {
    container_id: ContainerId,
    /// Registered with epoll; reads drain the kernel's OOM counter.
    event_file: File,
    /// The registration in `cgroup.event_control` is tied to this fd.
    _oom_control: File,
    event_control: PathBuf,
}

impl Watch {
    fn deregister(&self, epoll: &Epoll) {
        let result = match self {
            Watch::Wake => Ok(()),
            Watch::Exit { fd, .. } => epoll.delete(fd),
            Watch::Oom(w) => epoll.delete(&w.event_file),
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to deregister monitor watch");
        }
    }
}

struct Inner {
    epoll: Epoll,
    registry: Mutex<HashMap<u64, Watch>>,
    wake_tx: File,
    wake_token: u64,
    shutdown: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the monitoring thread. Cheap to clone; all clones share one
/// epoll set and one thread.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<Inner>,
}

impl Monitor {
    /// Start the monitoring thread and return the handle plus the two
    /// notice channels it feeds.
    pub fn new() -> Result<
        (Self, mpsc::Receiver<ExitNotice>, mpsc::Receiver<OomNotice>),
        MonitorError,
    > {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC).map_err(errno_io)?;

        let (wake_rx, wake_tx) = nix::unistd::pipe().map_err(errno_io)?;
        let wake_token = wake_rx.as_raw_fd() as u64;
        epoll
            .add(&wake_rx, EpollEvent::new(EpollFlags::EPOLLIN, wake_token))
            .map_err(errno_io)?;

        let mut registry = HashMap::new();
        // The wake pipe's read end lives in the registry so it is closed on
        // teardown with everything else.
        registry.insert(wake_token, Watch::Wake);

        let (exits_tx, exits_rx) = mpsc::channel(NOTICE_CAPACITY);
        let (ooms_tx, ooms_rx) = mpsc::channel(NOTICE_CAPACITY);

        let inner = Arc::new(Inner {
            epoll,
            registry: Mutex::new(registry),
            wake_tx: File::from(wake_tx),
            wake_token,
            shutdown: AtomicBool::new(false),
            thread: Mutex::new(None),
        });

        let wake_file = File::from(wake_rx);
        let thread_inner = Arc::clone(&inner);
        let handle = std::thread::Builder::new()
            .name("sv-monitor".to_string())
            .spawn(move || run(thread_inner, wake_file, exits_tx, ooms_tx))?;
        *inner.thread.lock() = Some(handle);

        Ok((Self { inner }, exits_rx, ooms_rx))
    }

    /// Register a process's exit-FIFO read end. The monitor takes ownership
    /// of the descriptor and closes it once the hangup has been observed.
    pub fn watch_exit(
        &self,
        container_id: ContainerId,
        process_id: ProcessId,
        fd: OwnedFd,
    ) -> Result<(), MonitorError> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(MonitorError::Closed);
        }
        let token = fd.as_raw_fd() as u64;
        self.inner
            .epoll
            .add(&fd, EpollEvent::new(EpollFlags::EPOLLIN | EpollFlags::EPOLLHUP, token))
            .map_err(errno_io)?;
        self.inner
            .registry
            .lock()
            .insert(token, Watch::Exit { container_id, process_id, fd });
        Ok(())
    }

    /// Register an OOM watch for the memory cgroup at `cgroup_dir`.
    ///
    /// Opens `memory.oom_control`, creates an eventfd, and ties the two
    /// together through `cgroup.event_control`. Fails with a NotFound io
    /// error when the cgroup is already gone (container exited).
    pub fn watch_oom(
        &self,
        container_id: ContainerId,
        cgroup_dir: &Path,
    ) -> Result<(), MonitorError> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(MonitorError::Closed);
        }
        let oom_control = File::open(cgroup_dir.join("memory.oom_control"))?;
        let efd = EventFd::from_value_and_flags(
            0,
            EfdFlags::EFD_CLOEXEC | EfdFlags::EFD_NONBLOCK,
        )
        .map_err(errno_io)?;
        let event_file = File::from(efd.as_fd().try_clone_to_owned()?);

        let event_control = cgroup_dir.join("cgroup.event_control");
        let line = format!("{} {}", event_file.as_raw_fd(), oom_control.as_raw_fd());
        std::fs::write(&event_control, line)?;

        let token = event_file.as_raw_fd() as u64;
        self.inner
            .epoll
            .add(&event_file, EpollEvent::new(EpollFlags::EPOLLIN, token))
            .map_err(errno_io)?;
        self.inner.registry.lock().insert(
            token,
            Watch::Oom(OomWatch {
                container_id,
                event_file,
                _oom_control: oom_control,
                event_control,
            }),
        );
        Ok(())
    }

    /// Tear down the polling set. Idempotent; joins the wait thread.
    pub fn close(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = (&self.inner.wake_tx).write_all(&[1]);
        if let Some(handle) = self.inner.thread.lock().take() {
            let _ = handle.join();
        }
        let mut registry = self.inner.registry.lock();
        for watch in registry.values() {
            watch.deregister(&self.inner.epoll);
        }
        registry.clear();
    }

    /// Write 8 bytes into the OOM eventfd registered for `container_id`,
    /// simulating the kernel notification.
    #[cfg(test)]
    pub(crate) fn simulate_oom(&self, container_id: &str) -> bool {
        let registry = self.inner.registry.lock();
        for watch in registry.values() {
            if let Watch::Oom(w) = watch {
                if w.container_id == *container_id {
                    return (&w.event_file).write_all(&1u64.to_ne_bytes()).is_ok();
                }
            }
        }
        false
    }
}

fn run(
    inner: Arc<Inner>,
    wake_file: File,
    exits_tx: mpsc::Sender<ExitNotice>,
    ooms_tx: mpsc::Sender<OomNotice>,
) {
    let mut events = vec![EpollEvent::empty(); 64];
    loop {
        let ready = match inner.epoll.wait(&mut events, EpollTimeout::NONE) {
            Ok(n) => n,
            Err(Errno::EINTR) => continue,
            Err(e) => {
                // A wait failure means the poll set itself is corrupt; there
                // is no way to keep delivering exits, so the daemon dies.
                error!(error = %e, "monitor wait failed");
                std::process::exit(1);
            }
        };

        let mut exit_notices = Vec::new();
        let mut oom_notices = Vec::new();
        {
            let mut registry = inner.registry.lock();
            let mut finished = Vec::new();
            for event in events.iter().take(ready) {
                let token = event.data();
                if token == inner.wake_token {
                    let mut buf = [0u8; 64];
                    let _ = (&wake_file).read(&mut buf);
                    continue;
                }
                match registry.get(&token) {
                    Some(Watch::Exit { container_id, process_id, .. }) => {
                        exit_notices.push(ExitNotice {
                            container_id: container_id.clone(),
                            process_id: process_id.clone(),
                        });
                        finished.push(token);
                    }
                    Some(Watch::Oom(watch)) => {
                        let mut buf = [0u8; 8];
                        if (&watch.event_file).read(&mut buf).is_err() {
                            // Spurious wakeup; the counter was already drained.
                            continue;
                        }
                        if watch.event_control.exists() {
                            oom_notices.push(OomNotice {
                                container_id: watch.container_id.clone(),
                            });
                        } else {
                            // Cgroup removed: the watch is terminal.
                            debug!(id = %watch.container_id, "oom watch cgroup gone");
                            finished.push(token);
                        }
                    }
                    Some(Watch::Wake) | None => {}
                }
            }
            for token in finished {
                if let Some(watch) = registry.remove(&token) {
                    watch.deregister(&inner.epoll);
                }
            }
        }

        if inner.shutdown.load(Ordering::Acquire) {
            return;
        }
        for notice in exit_notices {
            if exits_tx.blocking_send(notice).is_err() {
                return;
            }
        }
        for notice in oom_notices {
            if ooms_tx.blocking_send(notice).is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
#[path = "linux_tests.rs"]
mod tests;
