use super::{ReadMode, WriteMode};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub(super) struct Counters {
    pub forwarded: AtomicU64,
    pub push_dropped: AtomicU64,
    pub injected: AtomicU64,
    pub inject_dropped: AtomicU64,
    pub interrupts: AtomicU64,
    pub registrations: AtomicU64,
    pub teardowns: AtomicU64,
    pub skipped_flushes: AtomicU64,
}

impl Counters {
    pub fn add(counter: &AtomicU64, amount: usize) {
        if amount > 0 {
            counter.fetch_add(amount as u64, Ordering::Relaxed);
        }
    }

    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of the engine, rendered as JSON by the host's `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct VtermStats {
    pub active: bool,
    pub backend: &'static str,
    pub generation: u64,
    pub read_mode: Option<ReadMode>,
    pub write_mode: Option<WriteMode>,
    /// Bytes waiting in the coalescing buffer, when the lock was free to look.
    pub buffered: Option<usize>,
    pub forwarded_bytes: u64,
    pub push_dropped_bytes: u64,
    pub injected_bytes: u64,
    pub inject_dropped_bytes: u64,
    pub interrupts: u64,
    pub registrations: u64,
    pub teardowns: u64,
    pub skipped_flushes: u64,
}
