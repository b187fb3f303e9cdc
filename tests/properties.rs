//! Property-based tests over randomized inputs (SPEC_FULL.md §10.7).

use quickcheck_macros::quickcheck;
use std::time::Duration;

use cuckoo_cache::{CacheConfig, Expiry, Handle, OpStatus};

fn fresh_handle() -> Handle {
    Handle::new(CacheConfig {
        initial_capacity_hint: 1 << 10,
        eviction_enabled: false,
        resize_check_interval: Duration::from_secs(3600),
        eviction_threshold: 1,
    })
    .unwrap()
}

/// A sequence of successful `set`s on the same key produces strictly
/// increasing, consecutive `cas_id`s starting at 1.
#[quickcheck]
fn set_sequence_produces_consecutive_cas_ids(bodies: Vec<Vec<u8>>) -> bool {
    if bodies.is_empty() || bodies.len() > 64 {
        return true;
    }
    let h = fresh_handle();
    let mut expected = 0u64;
    for body in &bodies {
        expected += 1;
        let r = h.set(b"prop-key", body.as_slice(), 0, Expiry::Never).unwrap();
        if r.status != OpStatus::Stored {
            return false;
        }
        if r.value.unwrap().cas_id != expected {
            return false;
        }
    }
    true
}

/// `set(k, v)` followed immediately by `get(k)` always returns exactly the
/// bytes that were set, for any byte string.
#[quickcheck]
fn set_then_get_returns_same_bytes(key: Vec<u8>, value: Vec<u8>) -> bool {
    if key.is_empty() {
        return true;
    }
    let h = fresh_handle();
    h.set(&key, value.as_slice(), 0, Expiry::Never).unwrap();
    match h.get(&key).unwrap().value {
        Some(rec) => &*rec.bytes == value.as_slice(),
        None => false,
    }
}

/// Deleting a key that was just set always makes it subsequently absent,
/// regardless of key/value content.
#[quickcheck]
fn delete_after_set_makes_key_absent(key: Vec<u8>, value: Vec<u8>) -> bool {
    if key.is_empty() {
        return true;
    }
    let h = fresh_handle();
    h.set(&key, value.as_slice(), 0, Expiry::Never).unwrap();
    h.delete(&key, 0).unwrap();
    h.get(&key).unwrap().value.is_none()
}
