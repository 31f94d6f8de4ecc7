// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container stats sampling

use serde::{Deserialize, Serialize};

/// One point-in-time stats sample, produced by `<runtime> events --stats`.
///
/// The runtime's cgroup counters are passed through opaquely; the
/// supervisor stamps the collection time and does not interpret them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    /// Wall-clock collection time in epoch milliseconds.
    pub timestamp: u64,
    pub data: serde_json::Value,
}

/// Envelope the runtime prints on stdout: only `data` is required.
#[derive(Debug, Deserialize)]
pub(crate) struct StatsEnvelope {
    pub data: serde_json::Value,
}
