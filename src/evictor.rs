//! Background clock-hand evictor.
//!
//! Grounded on `map.go`'s `enableEviction`/`processEvictions`/`evict`: a
//! single worker thread owns a hand position, sweeps bins in order, and
//! evicts the first entry it finds whose advisory read flag is unset
//! (clearing the flag instead, on a second pass, the classic clock
//! algorithm). Requests arrive via a channel of one-shot reply channels —
//! the same "chan chan struct{}" shape the original uses so a caller can
//! block until its specific request was served.
//!
//! The worker tracks the table via the same `RwLock<Arc<Table>>` slot
//! `resize.rs` writes to, not a fixed `Arc<Table>` — a resize swaps in a
//! strictly bigger table, so the clock hand stays in range across the
//! swap, but a fixed reference would have the evictor stuck sweeping a
//! table nothing inserts into anymore.
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::RwLock;

use crate::table::{Table, ASSOCIATIVITY, EvictReply};

pub struct Evictor {
    handle: Option<JoinHandle<()>>,
    shutdown: mpsc::Sender<()>,
}

impl Evictor {
    /// Spawn the evictor thread and wire it into the current table's
    /// eviction-request channel. Dropping or calling [`Evictor::shutdown`]
    /// stops the thread.
    pub fn spawn(slot: Arc<RwLock<Arc<Table>>>) -> Evictor {
        let (req_tx, req_rx) = mpsc::channel::<EvictReply>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        slot.read().set_evict_request(Some(req_tx));

        let handle = std::thread::Builder::new()
            .name("cuckoo-cache-evictor".into())
            .spawn(move || run(slot, req_rx, shutdown_rx))
            .expect("failed to spawn evictor thread");

        Evictor {
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

impl Drop for Evictor {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

fn run(slot: Arc<RwLock<Arc<Table>>>, req_rx: mpsc::Receiver<EvictReply>, shutdown_rx: mpsc::Receiver<()>) {
    let mut hand_bin: usize = 0;
    let mut hand_slot: usize = 0;

    loop {
        if shutdown_rx.try_recv().is_ok() {
            return;
        }
        let reply = match req_rx.recv_timeout(std::time::Duration::from_millis(100)) {
            Ok(reply) => reply,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
        };

        let table = Arc::clone(&slot.read());
        sweep_and_evict(&table, &mut hand_bin, &mut hand_slot);
        let _ = reply.send(());
    }
}

/// Advance the clock hand at most twice around the whole table: first pass
/// clears read flags and skips recently-read slots, second pass evicts the
/// first present slot it finds (everything's flag has now been cleared, so
/// this always terminates on a nonempty table).
fn sweep_and_evict(table: &Table, hand_bin: &mut usize, hand_slot: &mut usize) {
    let bin_count = table.bin_count();
    if *hand_bin >= bin_count {
        // table grew smaller than our hand position only if it shrank,
        // which never happens, but stay defensive against a fresh, smaller
        // table some future caller might install.
        *hand_bin = 0;
        *hand_slot = 0;
    }
    let total = bin_count * ASSOCIATIVITY;
    let now = Instant::now();

    for pass in 0..2 {
        for _ in 0..total {
            let bin = &table.bins()[*hand_bin];
            let slot = *hand_slot;

            advance(hand_bin, hand_slot, bin_count);

            if !bin.is_present(slot, now) {
                continue;
            }
            if pass == 0 && bin.take_read_flag(slot) {
                continue;
            }

            let _g = bin.lock();
            if bin.is_present(slot, now) {
                bin.clear(slot);
                table.note_eviction();
                tracing::debug!(bin, slot, "evicted entry to satisfy eviction request");
                return;
            }
        }
    }
    tracing::debug!("eviction sweep found nothing to evict (table empty?)");
}

fn advance(hand_bin: &mut usize, hand_slot: &mut usize, bin_count: usize) {
    *hand_slot += 1;
    if *hand_slot == ASSOCIATIVITY {
        *hand_slot = 0;
        *hand_bin = (*hand_bin + 1) % bin_count;
    }
}
