//! Map core: a fixed-size table of set-associative [`Bin`]s.
//!
//! Grounded on `map.go` (`cmap`, `create`, `get`/`insert`/`del`/`touchall`/
//! `iterate`, `lock_in_order`/`unlock`, `enableEviction`/`processEvictions`/
//! `evict`). Table doubling (§4.11 of spec.md) is new — see `resize.rs` and
//! `DESIGN.md`.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::bin::Bin;
use crate::hash;
use crate::ops::{MemOp, OpStatus};
use crate::search;
use crate::value::ValueRecord;

/// Set-associativity of each bin (spec.md §3: "exactly A=8 slot cells").
pub const ASSOCIATIVITY: usize = 8;

/// Upper bound on the number of hash functions a table will use.
pub const MAX_HASHES: u32 = 10;

/// An eviction request handed to the evictor: a one-shot reply channel the
/// evictor signals once it has actually evicted something. Mirrors the
/// original's `chan chan struct{}` handoff.
pub type EvictReply = mpsc::Sender<()>;

pub struct Table {
    bins: Box<[Bin]>,
    n_hashes: AtomicU32,
    evicted: AtomicU64,
    evict_request: Mutex<Option<mpsc::Sender<EvictReply>>>,
}

impl Table {
    pub fn new(bin_count: usize) -> Table {
        assert!(bin_count.is_power_of_two(), "bin_count must be a power of two");
        Table {
            bins: (0..bin_count).map(|_| Bin::default()).collect(),
            n_hashes: AtomicU32::new(2),
            evicted: AtomicU64::new(0),
            evict_request: Mutex::new(None),
        }
    }

    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    pub fn n_hashes(&self) -> u32 {
        self.n_hashes.load(Ordering::Acquire)
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Attempt to bump `n_hashes` from `from` to `from + 1`, bounded by
    /// [`MAX_HASHES`]. Returns `true` if this call performed the bump.
    pub fn try_grow_hashes(&self, from: u32) -> bool {
        if from >= MAX_HASHES {
            return false;
        }
        self.n_hashes
            .compare_exchange(from, from + 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn set_evict_request(&self, tx: Option<mpsc::Sender<EvictReply>>) {
        *self.evict_request.lock() = tx;
    }

    pub fn has_evictor(&self) -> bool {
        self.evict_request.lock().is_some()
    }

    /// Clone of the current eviction-request sender, if any — used to carry
    /// an already-running evictor over to a freshly resized table.
    pub fn evict_request_sender(&self) -> Option<mpsc::Sender<EvictReply>> {
        self.evict_request.lock().clone()
    }

    /// Request one eviction from the evictor and block for its reply.
    /// Returns `false` if eviction is disabled for this table.
    pub fn evict(&self) -> bool {
        let tx = { self.evict_request.lock().clone() };
        match tx {
            Some(tx) => {
                let (reply_tx, reply_rx) = mpsc::channel();
                if tx.send(reply_tx).is_err() {
                    return false;
                }
                reply_rx.recv().is_ok()
            }
            None => false,
        }
    }

    pub(crate) fn note_eviction(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Compute the `n` bin indices for `key` given the table's current
    /// `n_hashes`, writing into a stack buffer sized to `MAX_HASHES`.
    fn kbins(&self, key: &[u8]) -> ([usize; MAX_HASHES as usize], usize) {
        let n = self.n_hashes() as usize;
        let mut buf = [0usize; MAX_HASHES as usize];
        hash::bins_for(key, self.bins.len(), &mut buf[..n]);
        (buf, n)
    }

    /// Lock bins (deduplicated) in strictly ascending index order — this is
    /// what keeps the global wait-for graph acyclic (spec.md invariant 5).
    fn lock_in_order<'a>(&'a self, bins: &[usize]) -> Vec<parking_lot::MutexGuard<'a, ()>> {
        let mut sorted: Vec<usize> = bins.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        sorted.into_iter().map(|b| self.bins[b].lock()).collect()
    }

    /// Read-only lookup. Lock-free; sets the matching slot's read flag.
    pub fn get(&self, key: &[u8], now: Instant) -> Option<Arc<ValueRecord>> {
        let (buf, n) = self.kbins(key);
        for &b in &buf[..n] {
            if let Some((i, rec)) = self.bins[b].has(key, now) {
                self.bins[b].mark_read(i);
                return Some(rec);
            }
        }
        None
    }

    /// Remove the entry for `key`. If `cas_id` is nonzero, only deletes on a
    /// match; a mismatch returns `Exists` without deleting.
    pub fn delete(&self, key: &[u8], cas_id: u64, now: Instant) -> (OpStatus, Option<Arc<ValueRecord>>) {
        let (buf, n) = self.kbins(key);
        let _guards = self.lock_in_order(&buf[..n]);
        for &b in &buf[..n] {
            if let Some((i, rec)) = self.bins[b].has(key, now) {
                if cas_id != 0 && rec.cas_id != cas_id {
                    return (OpStatus::Exists, None);
                }
                self.bins[b].clear(i);
                return (OpStatus::Stored, Some(rec));
            }
        }
        (OpStatus::NotFound, None)
    }

    /// If any of `candidate_bins` already has a free slot, apply `op`
    /// there directly without paying for a cuckoo-path search.
    fn try_direct(
        &self,
        candidate_bins: &[usize],
        key: &[u8],
        op: &MemOp,
        now: Instant,
    ) -> Option<(OpStatus, Option<Arc<ValueRecord>>)> {
        for (ordinal, &b) in candidate_bins.iter().enumerate() {
            if self.bins[b].available(now) {
                let (status, rec) = self.bins[b].try_add(
                    |old, existed, now| op.apply(old, existed, key, ordinal),
                    now,
                );
                if status != OpStatus::ServerError {
                    return Some((status, rec));
                }
            }
        }
        None
    }

    /// Set or update the entry for `key` via `op`, performing a cuckoo-path
    /// search and (if eviction is enabled) one eviction-and-retry when every
    /// candidate bin is full. Returns `ServerError` if none of that helps —
    /// callers (the op layer) are then responsible for growing `n_hashes`
    /// or triggering a resize and retrying.
    pub fn insert(&self, key: &[u8], op: &MemOp, now: Instant) -> (OpStatus, Option<Arc<ValueRecord>>) {
        let (mut buf, mut n) = self.kbins(key);

        // Step 1: is this key already present in one of its candidate bins?
        {
            let _guards = self.lock_in_order(&buf[..n]);
            for (ordinal, &b) in buf[..n].iter().enumerate() {
                if let Some((i, rec)) = self.bins[b].has(key, now) {
                    let (new, status) = op.apply(Some(&rec), true, key, ordinal);
                    if status == OpStatus::Stored {
                        let published = self.bins[b].publish_at(i, new.expect("Stored carries a record"));
                        return (OpStatus::Stored, Some(published));
                    }
                    return (status, None);
                }
            }
        }

        // Step 2: if the op would fail against absence anyway, don't bother
        // with the expensive insert-search.
        let (_, probe_status) = op.apply(None, false, key, 0);
        if probe_status != OpStatus::Stored {
            return (probe_status, None);
        }

        // Step 3: room without a search?
        if let Some(result) = self.try_direct(&buf[..n], key, op, now) {
            return result;
        }

        // Step 4: cuckoo-path search + validated execution, retried across
        // hash-count growth and (optionally) one eviction.
        loop {
            let path = search::find_path(self, &buf[..n], now);
            let Some(path) = path else {
                if self.evict() {
                    // eviction freed *some* slot, not necessarily one of
                    // ours (and with few bins, maybe the only one a search
                    // could ever reach) — recheck directly before paying
                    // for another search.
                    let (b2, n2) = self.kbins(key);
                    buf = b2;
                    n = n2;
                    if let Some(result) = self.try_direct(&buf[..n], key, op, now) {
                        return result;
                    }
                    continue;
                }
                return (OpStatus::ServerError, None);
            };

            let freeing = path[0].from;

            if n != self.n_hashes() as usize {
                let (b2, n2) = self.kbins(key);
                buf = b2;
                n = n2;
            }

            let to_ordinal = buf[..n].iter().position(|&b| b == freeing);
            let Some(ordinal) = to_ordinal else {
                // The path no longer helps this key (hash count changed
                // underneath us); recompute and try again.
                continue;
            };

            if search::validate_execute(self, &path, now) {
                let (status, rec) = self.bins[freeing].try_add(
                    |old, existed, now| op.apply(old, existed, key, ordinal),
                    now,
                );
                if status != OpStatus::ServerError {
                    return (status, rec);
                }
                // someone else grabbed the freed slot first; loop and
                // search again.
            }
        }
    }

    /// Lower every present entry's expiry to `at`. Blocks all concurrent
    /// modification for the duration (every bin lock is held).
    pub fn touch_all(&self, at: Instant) {
        let _guards: Vec<_> = self.bins.iter().map(|b| b.lock()).collect();
        for bin in self.bins.iter() {
            for i in 0..ASSOCIATIVITY {
                if let Some(rec) = bin.load(i) {
                    if rec.present(at) {
                        let mut updated = (*rec).clone();
                        updated.expires = crate::value::Expiry::At(at);
                        bin.publish(i, Some(updated));
                    }
                }
            }
        }
    }

    /// Snapshot every currently-present record. Acquires one bin lock at a
    /// time, copying its live entries out before moving on — never holds
    /// more than one bin locked at once, so a concurrent writer is never
    /// blocked for longer than a single bin's snapshot.
    pub fn iterate(&self, now: Instant) -> Vec<Arc<ValueRecord>> {
        let mut out = Vec::new();
        for bin in self.bins.iter() {
            let _g = bin.lock();
            for i in 0..ASSOCIATIVITY {
                if let Some(rec) = bin.load(i) {
                    if rec.present(now) {
                        out.push(rec);
                    }
                }
            }
        }
        out
    }
}
