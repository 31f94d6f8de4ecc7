// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sv-runtime: container and process model for the stevedore supervisor
//!
//! Owns the on-disk representation of a container and drives the OCI
//! runtime binary for state mutations. Long-running work (shim spawn) is
//! async so the supervisor loop can delegate it to workers.

pub mod cgroup;
mod container;
mod driver;
mod process;
mod shim;
mod state;
mod stats;

pub use container::{Container, ContainerOpts, Status};
pub use driver::OciDriver;
pub use process::{Process, Stdio, NULL_DEVICE, UNKNOWN_STATUS};
pub use shim::ShimLog;
pub use state::{ProcessSpec, ProcessState, StateFile, User};
pub use stats::Stat;
