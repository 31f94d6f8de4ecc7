// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event fan-out and the journal recorder
//!
//! The supervisor publishes each event once; the bus performs a
//! non-blocking send to every subscriber so a slow consumer can never
//! stall the loop. The bus's own recorder subscription drains to the
//! on-disk journal from a dedicated task, applying retention rollover —
//! disk I/O never runs on the loop thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use sv_core::{ContainerId, Event};
use sv_storage::{Journal, JournalError};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, warn};

/// Per-subscriber buffer capacity. A subscriber whose buffer is full
/// silently misses events until it drains.
pub const DEFAULT_BUFFER_SIZE: usize = 2048;

#[derive(Debug)]
struct Registration {
    filter: Option<ContainerId>,
    tx: mpsc::Sender<Event>,
}

#[derive(Debug)]
struct BusInner {
    /// Every event observed this daemon lifetime, journal replay included.
    /// Retention rollover trims it in lockstep with the on-disk journal.
    history: Mutex<Vec<Event>>,
    subscribers: RwLock<HashMap<u64, Registration>>,
    next_subscriber: AtomicU64,
    /// Last issued timestamp, for well-ordered event stamping.
    last_timestamp: Mutex<u64>,
    retention: usize,
}

/// A live event subscription. Dropping the receiver (or unsubscribing)
/// ends delivery.
pub struct Subscription {
    pub id: u64,
    pub rx: mpsc::Receiver<Event>,
}

/// Broadcast hub shared by the supervisor loop, its workers, and the
/// journal recorder.
#[derive(Clone, Debug)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// `initial` is the journal replay; `retention` of zero disables
    /// rollover.
    pub fn new(initial: Vec<Event>, retention: usize) -> Self {
        let last_timestamp = initial.last().map(|e| e.timestamp).unwrap_or(0);
        Self {
            inner: Arc::new(BusInner {
                history: Mutex::new(initial),
                subscribers: RwLock::new(HashMap::new()),
                next_subscriber: AtomicU64::new(1),
                last_timestamp: Mutex::new(last_timestamp),
                retention,
            }),
        }
    }

    /// Stamp an event so timestamps are strictly increasing even when the
    /// wall clock stalls within a millisecond.
    pub fn stamp(&self, mut event: Event, now_ms: u64) -> Event {
        let mut last = self.inner.last_timestamp.lock();
        *last = now_ms.max(*last + 1);
        event.timestamp = *last;
        event
    }

    /// Subscribe to events. With a non-zero `from`, events newer than that
    /// timestamp (and matching `filter`, when set) are replayed in
    /// chronological order before any live delivery. With `stored_only`
    /// the channel closes at end of replay.
    pub fn subscribe(
        &self,
        from: u64,
        stored_only: bool,
        filter: Option<ContainerId>,
    ) -> Subscription {
        self.subscribe_with_capacity(from, stored_only, filter, DEFAULT_BUFFER_SIZE)
    }

    pub(crate) fn subscribe_with_capacity(
        &self,
        from: u64,
        stored_only: bool,
        filter: Option<ContainerId>,
        capacity: usize,
    ) -> Subscription {
        let replay: Vec<Event> = if from > 0 {
            self.inner
                .history
                .lock()
                .iter()
                .filter(|e| {
                    e.timestamp > from
                        && filter.as_ref().map_or(true, |id| &e.id == id)
                })
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        let (tx, rx) = mpsc::channel(capacity.max(1) + replay.len());
        for event in replay {
            // Cannot fail: the channel was sized to hold the whole replay.
            let _ = tx.try_send(event);
        }

        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        if !stored_only {
            self.inner
                .subscribers
                .write()
                .insert(id, Registration { filter, tx });
        }
        Subscription { id, rx }
    }

    /// Remove a registration and close its channel.
    pub fn unsubscribe(&self, id: u64) {
        self.inner.subscribers.write().remove(&id);
    }

    /// Deliver one event to every matching subscriber without blocking.
    pub fn publish(&self, event: Event) {
        debug!(event = %event.log_summary(), "event");
        let subscribers = self.inner.subscribers.read();
        for (id, registration) in subscribers.iter() {
            if let Some(filter) = &registration.filter {
                if &event.id != filter {
                    continue;
                }
            }
            match registration.tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(subscriber = id, "subscriber buffer full; event dropped");
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
    }

    /// Append one event to the in-memory vector and the journal, rolling
    /// the journal over when the vector exceeds the retention count.
    ///
    /// On rollover the vector is cut to its most recent `retention - 1`
    /// entries and the journal is rewritten to exactly that set; the event
    /// that triggered the cut is already part of it, so nothing extra is
    /// appended.
    pub fn record(&self, journal: &mut Journal, event: Event) -> Result<(), JournalError> {
        let mut history = self.inner.history.lock();
        history.push(event);
        if self.inner.retention > 0 && history.len() > self.inner.retention {
            let cut = history.len() - (self.inner.retention - 1);
            history.drain(..cut);
            return journal.rewrite(&history);
        }
        match history.last() {
            Some(event) => journal.append(event),
            None => Ok(()),
        }
    }

    /// Snapshot of the in-memory event vector.
    pub fn history(&self) -> Vec<Event> {
        self.inner.history.lock().clone()
    }

    /// Drop every registration, closing all subscriber channels. The
    /// recorder drains its remaining buffer and stops.
    pub fn close(&self) {
        self.inner.subscribers.write().clear();
    }
}

/// Spawn the journal recorder: the supervisor's own subscription, drained
/// off the loop thread.
pub fn spawn_recorder(bus: EventBus, mut journal: Journal) -> tokio::task::JoinHandle<()> {
    let mut subscription = bus.subscribe(0, false, None);
    tokio::spawn(async move {
        while let Some(event) = subscription.rx.recv().await {
            if let Err(e) = bus.record(&mut journal, event) {
                error!(error = %e, "failed to journal event");
            }
        }
    })
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
