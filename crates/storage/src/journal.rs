// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only event journal
//!
//! One JSON-encoded [`Event`] per line. No checksums: a partial final line
//! left by a crash is tolerated by the reader, which yields every
//! fully-written entry and stops at the first malformed one. Retention
//! rollover is driven by the owner of the in-memory event vector via
//! [`Journal::rewrite`].

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use sv_core::Event;
use thiserror::Error;
use tracing::warn;

/// Journal errors
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal io: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal encode: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Durable newline-delimited JSON log of lifecycle events.
pub struct Journal {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl Journal {
    /// Open the journal at `path`, creating parent directories and the file
    /// if needed. Existing content is preserved; new entries are appended.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, writer: BufWriter::new(file) })
    }

    /// Path the journal writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every fully-written event in journal order.
    ///
    /// EOF and a malformed tail are both acceptable terminators: the scan
    /// stops at the first line that does not decode and returns everything
    /// before it.
    pub fn replay(&self) -> Result<Vec<Event>, JournalError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        let mut line = Vec::new();
        loop {
            line.clear();
            let n = reader.read_until(b'\n', &mut line)?;
            if n == 0 {
                break;
            }
            if line.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            match serde_json::from_slice::<Event>(&line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "journal scan stopped at malformed entry");
                    break;
                }
            }
        }
        Ok(events)
    }

    /// Append one event and flush it to disk.
    pub fn append(&mut self, event: &Event) -> Result<(), JournalError> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Truncate the journal and re-encode `events` as its new contents.
    ///
    /// Used at retention rollover: the caller keeps the newest entries in
    /// memory and hands them here after the cut.
    pub fn rewrite(&mut self, events: &[Event]) -> Result<(), JournalError> {
        let file = OpenOptions::new().create(true).write(true).truncate(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        for event in events {
            serde_json::to_writer(&mut self.writer, event)?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
