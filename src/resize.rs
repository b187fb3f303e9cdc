//! Resize supervisor: periodically grows the table's hash-function count,
//! and once that's exhausted, doubles the table outright.
//!
//! New functionality: the original has no online-resize path (see
//! `DESIGN.md`). The escalation order — grow `n_hashes` up to [`MAX_HASHES`]
//! before ever reallocating — mirrors the op layer's own escalation in
//! `handle.rs`, just on a slower, load-driven clock instead of a
//! per-call-retry one.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::RwLock;
use std::sync::mpsc;

use crate::config::CacheConfig;
use crate::ops::MemOp;
use crate::table::{Table, ASSOCIATIVITY, MAX_HASHES};

pub struct ResizeSupervisor {
    handle: Option<JoinHandle<()>>,
    shutdown: mpsc::Sender<()>,
}

impl ResizeSupervisor {
    pub fn spawn(slot: Arc<RwLock<Arc<Table>>>, config: CacheConfig) -> ResizeSupervisor {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("cuckoo-cache-resize".into())
            .spawn(move || run(slot, config, shutdown_rx))
            .expect("failed to spawn resize supervisor thread");
        ResizeSupervisor {
            handle: Some(handle),
            shutdown: shutdown_tx,
        }
    }

    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for ResizeSupervisor {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

fn run(slot: Arc<RwLock<Arc<Table>>>, config: CacheConfig, shutdown_rx: mpsc::Receiver<()>) {
    let mut last_evicted = { slot.read().evicted() };
    loop {
        match shutdown_rx.recv_timeout(config.resize_check_interval) {
            Ok(()) => return,
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }
        let evicted_now = { slot.read().evicted() };
        let delta = evicted_now.saturating_sub(last_evicted);
        last_evicted = evicted_now;
        tick(&slot, &config, delta);
    }
}

/// One maintenance pass: escalate if either the table is under load
/// pressure (load factor above the classic cuckoo-hashing comfort zone) or
/// the evictor has been busy since the last tick (`delta >=
/// eviction_threshold`). Escalation grows `n_hashes` until it hits
/// [`MAX_HASHES`], then doubles the table.
///
/// The doubling step holds `slot`'s exclusive lock for the entire rehash,
/// not just the final swap — a concurrent `Handle::run` call snapshots the
/// table under this same lock (`current_table`), so nothing can insert into
/// the table being replaced while the rehash is in flight (spec §5: "holds
/// the resize lock for the full rehash"). This mirrors `handle.rs`'s
/// `escalate`.
fn tick(slot: &Arc<RwLock<Arc<Table>>>, config: &CacheConfig, evicted_delta: u64) {
    let now = Instant::now();
    let n = { slot.read().n_hashes() };

    if n < MAX_HASHES {
        let table = { Arc::clone(&*slot.read()) };
        if !under_pressure(&table, now) && evicted_delta < config.eviction_threshold {
            return;
        }
        if table.try_grow_hashes(n) {
            tracing::info!(from = n, to = n + 1, "grew hash function count");
        }
        return;
    }

    let mut w = slot.write();
    if !under_pressure(&w, now) && evicted_delta < config.eviction_threshold {
        return;
    }

    tracing::info!(
        bin_count = w.bin_count(),
        "hash growth exhausted, doubling table"
    );
    let bigger = rehash_into_bigger(&w, now);
    bigger.set_evict_request(w.evict_request_sender());
    let new_bin_count = bigger.bin_count();
    *w = Arc::new(bigger);
    tracing::info!(bin_count = new_bin_count, "table resize complete");
}

/// Load factor above ~80% is cuckoo hashing's well-known discomfort zone:
/// insert latency and displacement-search depth both climb sharply past it.
fn under_pressure(table: &Table, now: Instant) -> bool {
    let capacity = table.bin_count() * ASSOCIATIVITY;
    let occupied = table.iterate(now).len();
    occupied as f64 >= capacity as f64 * 0.8
}

/// Build a table with double the bin count and re-insert every live entry
/// from `old`. Entries are replayed through [`Table::insert`] with a `Set`
/// so each one lands fresh under the new, larger hash space — the resize
/// equivalent of the original's `rehash`. A re-insert that fails to find
/// room is retried with one extra hash function, up to [`MAX_HASHES`], so a
/// rehash can never silently lose a live entry.
pub(crate) fn rehash_into_bigger(old: &Table, now: Instant) -> Table {
    let bigger = Table::new(old.bin_count() * 2);
    for rec in old.iterate(now) {
        let op = MemOp::Set {
            bytes: rec.bytes.clone(),
            flags: rec.flags,
            expires: rec.expires,
        };
        loop {
            let (status, _) = bigger.insert(&rec.key, &op, now);
            if status == crate::ops::OpStatus::Stored {
                break;
            }
            let n = bigger.n_hashes();
            if n >= MAX_HASHES || !bigger.try_grow_hashes(n) {
                tracing::warn!(
                    "entry dropped during resize: re-insert failed even at max hash count"
                );
                break;
            }
            tracing::debug!(from = n, to = n + 1, "grew hash count during rehash retry");
        }
    }
    bigger
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::OpStatus;
    use crate::value::Expiry;

    fn set(table: &Table, key: &[u8]) -> OpStatus {
        let op = MemOp::Set {
            bytes: b"v".as_slice().into(),
            flags: 0,
            expires: Expiry::Never,
        };
        table.insert(key, &op, Instant::now()).0
    }

    #[test]
    fn pressure_detection_follows_load_factor() {
        let t = Table::new(4);
        let now = Instant::now();
        assert!(!under_pressure(&t, now));
        for i in 0..28u32 {
            assert_eq!(set(&t, format!("k{i}").as_bytes()), OpStatus::Stored);
        }
        assert!(under_pressure(&t, now));
    }

    #[test]
    fn rehash_preserves_every_live_entry() {
        let t = Table::new(4);
        for i in 0..20u32 {
            set(&t, format!("k{i}").as_bytes());
        }
        let now = Instant::now();
        let bigger = rehash_into_bigger(&t, now);
        assert_eq!(bigger.bin_count(), 8);
        for i in 0..20u32 {
            assert!(bigger.get(format!("k{i}").as_bytes(), now).is_some());
        }
    }

    #[test]
    fn tick_grows_hashes_before_resizing() {
        let t = Arc::new(Table::new(4));
        for i in 0..28u32 {
            set(&t, format!("k{i}").as_bytes());
        }
        let slot = Arc::new(RwLock::new(Arc::clone(&t)));
        let before_n = t.n_hashes();
        tick(&slot, &CacheConfig::default(), 0);
        assert_eq!(slot.read().bin_count(), 4, "should have grown hashes, not resized, on first tick");
        assert!(slot.read().n_hashes() > before_n);
    }
}
