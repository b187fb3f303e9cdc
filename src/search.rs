//! Cuckoo-path search and validated execution.
//!
//! Grounded on `search.go` (`search`/`find`/`validate_execute`). The search
//! itself is lock-free and produces a *proposal*; only `validate_execute`
//! takes locks, re-checking every assumption the search made before moving
//! anything.

use std::time::Instant;

use crate::table::{Table, ASSOCIATIVITY};

pub const MAX_SEARCH_DEPTH: usize = 1000;

/// One proposed move: relocate `key`'s occupant from bin `from` to bin `to`,
/// which will become its hash ordinal `to_ordinal` once moved.
#[derive(Debug, Clone)]
pub struct Move {
    pub key: Box<[u8]>,
    pub from: usize,
    pub to: usize,
    pub to_ordinal: usize,
}

/// Try every starting bin at increasing depth bounds (iterative deepening),
/// as the original does, until a path is found or `MAX_SEARCH_DEPTH` is
/// exhausted.
pub fn find_path(table: &Table, start_bins: &[usize], now: Instant) -> Option<Vec<Move>> {
    for depth in 1..MAX_SEARCH_DEPTH {
        for &b in start_bins {
            if let Some(path) = find(table, &[], b, depth, now) {
                return Some(path);
            }
        }
    }
    None
}

/// Depth-bounded DFS from `bin`. `path` is the sequence of moves accumulated
/// so far by the caller (always empty at the top-level call from
/// [`find_path`]); recursion depth is bounded by `depth` (<=
/// `MAX_SEARCH_DEPTH`).
fn find(table: &Table, path: &[Move], bin: usize, depth: usize, now: Instant) -> Option<Vec<Move>> {
    if depth == 0 {
        return None;
    }
    for i in 0..ASSOCIATIVITY {
        let Some(occupant) = table.bins()[bin].load(i) else {
            continue;
        };
        if !occupant.present(now) {
            continue;
        }

        let from = bin;
        let n = table.n_hashes() as usize;
        let mut to = from;
        let mut to_ordinal = occupant.hash_ordinal;
        for _ in 0..n {
            to_ordinal = (to_ordinal + 1) % n;
            to = crate::hash::bin_for(&occupant.key, to_ordinal, table.bin_count());
            if to != from {
                break;
            }
        }
        if to == from {
            // this occupant has no alternate bin under the current hash
            // count; try the next occupant slot.
            continue;
        }

        if path.iter().any(|m| m.from == to) {
            // would create a cycle; try the next occupant slot.
            continue;
        }

        let mut path_ = Vec::with_capacity(path.len() + 1);
        path_.extend_from_slice(path);
        path_.push(Move {
            key: occupant.key.clone(),
            from,
            to,
            to_ordinal,
        });

        if table.bins()[to].available(now) {
            return Some(path_);
        }
        if let Some(found) = find(table, &path_, to, depth - 1, now) {
            return Some(found);
        }
        // fall through: this occupant's subtree was a dead end, try the
        // next occupant slot in `bin`.
    }
    None
}

/// Process `path` in reverse, acquiring both bins' locks for each move and
/// re-validating every assumption the lock-free search made. Returns `true`
/// only if every move succeeded — a transient conflict anywhere causes the
/// whole path to be abandoned so the caller can search again.
pub fn validate_execute(table: &Table, path: &[Move], now: Instant) -> bool {
    for mv in path.iter().rev() {
        let (lo, hi) = if mv.from < mv.to {
            (mv.from, mv.to)
        } else {
            (mv.to, mv.from)
        };
        let _g_lo = table.bins()[lo].lock();
        let _g_hi = if hi != lo {
            Some(table.bins()[hi].lock())
        } else {
            None
        };

        if !table.bins()[mv.to].available(now) {
            tracing::debug!(to = mv.to, "cuckoo path stale: target bucket now full");
            return false;
        }

        let mut found_slot = None;
        for j in 0..ASSOCIATIVITY {
            if let Some(rec) = table.bins()[mv.from].load(j) {
                if rec.present(now) && &*rec.key == &*mv.key {
                    found_slot = Some((j, rec));
                    break;
                }
            }
        }
        let Some((j, rec)) = found_slot else {
            tracing::debug!(from = mv.from, "cuckoo path stale: key already moved");
            return false;
        };

        let mut moved = (*rec).clone();
        moved.hash_ordinal = mv.to_ordinal;
        table.bins()[mv.to].fill_empty(moved, now);
        table.bins()[mv.from].clear(j);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{MemOp, OpStatus};
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
    fn search_finds_path_when_bins_full_but_table_isnt() {
        let t = Table::new(4);
        for i in 0..20u32 {
            assert_eq!(set(&t, format!("k{i}").as_bytes()), OpStatus::Stored);
        }
        // the table isn't full (20 of 32 slots used); an extra insert must
        // succeed, possibly via displacement.
        assert_eq!(set(&t, b"one-more"), OpStatus::Stored);
    }
}
