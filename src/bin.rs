//! A single set-associative bin: [`ASSOCIATIVITY`] slots plus a write lock.
//!
//! Grounded on `bins.go`'s `cbin`/`aval` (`v`/`setv`/`subin`/`kill`/
//! `available`/`add`/`has`). Reads are lock-free (a single atomic load per
//! slot); writes take the bin's lock.

use std::time::Instant;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::ops::OpStatus;
use crate::table::ASSOCIATIVITY;
use crate::value::ValueRecord;

/// One slot cell: an atomically-swapped optional value plus a cached tag
/// byte and an advisory read flag.
///
/// `tag` and `read` are written without the bin lock in some paths (the tag
/// only under the lock via [`Bin::publish`]; `read` is set lock-free on
/// every successful read, per spec.md §4.4 — "a single-byte advisory write,
/// racy by design").
pub struct Slot {
    value: ArcSwapOption<ValueRecord>,
    tag: AtomicU8,
    read: AtomicBool,
}

impl Default for Slot {
    fn default() -> Self {
        Slot {
            value: ArcSwapOption::from(None),
            tag: AtomicU8::new(0),
            read: AtomicBool::new(false),
        }
    }
}

pub struct Bin {
    slots: [Slot; ASSOCIATIVITY],
    lock: Mutex<()>,
}

impl Default for Bin {
    fn default() -> Self {
        Bin {
            slots: Default::default(),
            lock: Mutex::new(()),
        }
    }
}

impl Bin {
    /// Lock-free load of slot `i`'s current record, if any. A single atomic
    /// load plus a refcount bump — readers never observe a torn record.
    pub fn load(&self, i: usize) -> Option<std::sync::Arc<ValueRecord>> {
        self.slots[i].value.load_full()
    }

    pub fn is_present(&self, i: usize, now: Instant) -> bool {
        match self.load(i) {
            Some(rec) => rec.present(now),
            None => false,
        }
    }

    /// Set the advisory read flag for slot `i`. Lock-free, races permitted.
    pub fn mark_read(&self, i: usize) {
        self.slots[i].read.store(true, Ordering::Relaxed);
    }

    /// Clear the advisory read flag for slot `i`, returning its prior value.
    /// Used by the evictor's clock hand.
    pub fn take_read_flag(&self, i: usize) -> bool {
        self.slots[i].read.swap(false, Ordering::Relaxed)
    }

    /// Linear scan: tag compare first, then full key + presence check.
    /// Returns the slot index and a handle to the record, or `None`.
    pub fn has(
        &self,
        key: &[u8],
        now: Instant,
    ) -> Option<(usize, std::sync::Arc<ValueRecord>)> {
        let tag = key.first().copied().unwrap_or(0);
        for i in 0..ASSOCIATIVITY {
            if self.slots[i].tag.load(Ordering::Relaxed) != tag {
                continue;
            }
            if let Some(rec) = self.load(i) {
                if rec.holds(key, now) {
                    return Some((i, rec));
                }
            }
        }
        None
    }

    /// Any non-present slot exists.
    pub fn available(&self, now: Instant) -> bool {
        (0..ASSOCIATIVITY).any(|i| !self.is_present(i, now))
    }

    /// Publish `record` into slot `i`, returning a shared handle to it.
    /// Caller must hold `self.lock()`.
    pub(crate) fn publish(&self, i: usize, record: Option<ValueRecord>) -> Option<std::sync::Arc<ValueRecord>> {
        self.slots[i]
            .tag
            .store(record.as_ref().map(|r| r.tag()).unwrap_or(0), Ordering::Relaxed);
        let rc = record.map(std::sync::Arc::new);
        self.slots[i].value.store(rc.clone());
        rc
    }

    /// Clear slot `i`. Caller must hold `self.lock()`.
    pub fn clear(&self, i: usize) {
        self.publish(i, None);
    }

    /// Find the first non-present slot and publish `record` there, marking
    /// it read. No-op (returns `None`) if the bin is full. Caller must hold
    /// `self.lock()`.
    pub fn fill_empty(
        &self,
        record: ValueRecord,
        now: Instant,
    ) -> Option<(usize, std::sync::Arc<ValueRecord>)> {
        for i in 0..ASSOCIATIVITY {
            if !self.is_present(i, now) {
                let rc = self.publish(i, Some(record))?;
                self.mark_read(i);
                return Some((i, rc));
            }
        }
        None
    }

    /// Publish `record` directly into slot `i`, marking it read (used by the
    /// map core on an in-place update of an already-located slot). Caller
    /// must hold `self.lock()`.
    pub fn publish_at(&self, i: usize, record: ValueRecord) -> std::sync::Arc<ValueRecord> {
        let rc = self.publish(i, Some(record)).expect("Some in, Some out");
        self.mark_read(i);
        rc
    }

    /// Acquire the bin's write lock.
    pub fn lock(&self) -> parking_lot::MutexGuard<'_, ()> {
        self.lock.lock()
    }

    /// If any slot is non-present, invoke `op` with `(None, false)` to
    /// produce the new record; on `OpStatus::Stored` publish it and return
    /// `Stored` plus a handle to the published record. If no slot is free,
    /// returns `OpStatus::ServerError` — the signal that triggers the
    /// cuckoo-path search.
    pub fn try_add(
        &self,
        op: impl FnOnce(Option<&ValueRecord>, bool, Instant) -> (Option<ValueRecord>, OpStatus),
        now: Instant,
    ) -> (OpStatus, Option<std::sync::Arc<ValueRecord>>) {
        let _g = self.lock();
        if !self.available(now) {
            return (OpStatus::ServerError, None);
        }
        let (new, status) = op(None, false, now);
        if status != OpStatus::Stored {
            return (status, None);
        }
        let rec = new.expect("Stored result must carry a record");
        match self.fill_empty(rec, now) {
            Some((_, rc)) => (OpStatus::Stored, Some(rc)),
            // Another writer raced us for the last free slot between our
            // `available()` check and `fill_empty()`.
            None => (OpStatus::ServerError, None),
        }
    }
}
