//! In-memory ping store
//!
//! Pings are kept in arrival order behind a single `RwLock`. Writers hold the
//! lock only for one `push` or one reset; readers copy the `Arc` handles out
//! and release it, so a snapshot never observes a half-written ping and never
//! blocks submitters for longer than a vector clone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use klaatu_common::Ping;
use parking_lot::RwLock;
use tracing::{debug, info};

/// Append-only, clearable log of submitted pings
#[derive(Debug, Default)]
pub struct PingStore {
    pings: RwLock<Vec<Arc<Ping>>>,
    /// Total accepted since startup, across clears
    received: AtomicU64,
}

impl PingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one ping; returns the store length right after the append.
    pub fn submit(&self, ping: Ping) -> usize {
        let len = {
            let mut pings = self.pings.write();
            pings.push(Arc::new(ping));
            pings.len()
        };
        let total = self.received.fetch_add(1, Ordering::Relaxed) + 1;

        debug!(stored = len, received_total = total, "Ping stored");
        len
    }

    /// Snapshot of every stored ping in arrival order
    pub fn list(&self) -> Vec<Arc<Ping>> {
        self.pings.read().clone()
    }

    /// Drop every stored ping; returns how many were removed.
    pub fn clear(&self) -> usize {
        let removed = std::mem::take(&mut *self.pings.write()).len();
        info!(removed, "Ping store cleared");
        removed
    }

    pub fn len(&self) -> usize {
        self.pings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pings accepted since the store was created, including cleared ones
    pub fn received_total(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}
