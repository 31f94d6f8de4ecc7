// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Memory-cgroup path resolution
//!
//! The OOM watch needs the absolute directory of a process's memory
//! cgroup. `/proc/<pid>/cgroup` names the path relative to the cgroup
//! hierarchy root, which is remapped against `/proc/self/mountinfo` so the
//! result is correct even when the supervisor itself runs inside a
//! container.

use std::path::PathBuf;

use sv_core::SupervisorError;

/// Absolute directory of `pid`'s memory cgroup on this host.
pub fn memory_cgroup_dir(pid: i32) -> Result<PathBuf, SupervisorError> {
    let cgroup = std::fs::read_to_string(format!("/proc/{pid}/cgroup"))?;
    let mountinfo = std::fs::read_to_string("/proc/self/mountinfo")?;
    resolve(&cgroup, &mountinfo).ok_or_else(|| {
        SupervisorError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no memory cgroup for pid {pid}"),
        ))
    })
}

fn resolve(cgroup: &str, mountinfo: &str) -> Option<PathBuf> {
    let cgroup_path = memory_cgroup_path(cgroup)?;
    let (mount_root, mountpoint) = memory_mount(mountinfo)?;
    // The /proc/<pid>/cgroup path is absolute within the hierarchy; the
    // mount may expose only a sub-tree of it (mount_root).
    let rel = cgroup_path.strip_prefix(&mount_root).unwrap_or(cgroup_path);
    Some(PathBuf::from(mountpoint).join(rel.trim_start_matches('/')))
}

/// Extract the memory controller's path from `/proc/<pid>/cgroup` contents
/// (`N:controller[,controller]:/path` per line).
fn memory_cgroup_path(contents: &str) -> Option<&str> {
    for line in contents.lines() {
        let mut fields = line.splitn(3, ':');
        let _id = fields.next()?;
        let controllers = fields.next()?;
        let path = fields.next()?;
        if controllers.split(',').any(|c| c == "memory") {
            return Some(path);
        }
    }
    None
}

/// Find the memory cgroup mount in `/proc/self/mountinfo`: returns
/// `(mount_root, mountpoint)` of the first `cgroup` filesystem whose super
/// options include `memory`.
fn memory_mount(mountinfo: &str) -> Option<(String, String)> {
    for line in mountinfo.lines() {
        let Some((pre, post)) = line.split_once(" - ") else {
            continue;
        };
        let pre_fields: Vec<&str> = pre.split(' ').collect();
        if pre_fields.len() < 5 {
            continue;
        }
        let mut post_fields = post.split(' ');
        let fstype = post_fields.next()?;
        let _source = post_fields.next();
        let super_opts = post_fields.next().unwrap_or("");
        if fstype == "cgroup" && super_opts.split(',').any(|o| o == "memory") {
            return Some((pre_fields[3].to_string(), pre_fields[4].to_string()));
        }
    }
    None
}

#[cfg(test)]
#[path = "cgroup_tests.rs"]
mod tests;
