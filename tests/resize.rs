//! Invariant 5 (spec.md §8): after a resize, every key present beforehand
//! (and not deleted since) is still readable with the same bytes and flags.
//! Grounded directly in the original's own resize exercise
//! (`examples/original_source/src/cuckood/map_test.go`'s `TestResize`):
//! insert far more keys than the initial capacity and confirm nothing is
//! lost once hash growth and table doubling have both kicked in.

use std::time::Duration;

use cuckoo_cache::{CacheConfig, Expiry, Handle, OpStatus};

#[test]
fn surviving_keys_readable_after_forced_resize() {
    let h = Handle::new(CacheConfig {
        initial_capacity_hint: 32,
        eviction_enabled: false,
        resize_check_interval: Duration::from_millis(10),
        eviction_threshold: 1,
    })
    .unwrap();

    let total = 2000u32;
    for i in 0..total {
        let bytes = format!("value-{i}");
        let r = h
            .set(format!("key-{i}").as_bytes(), bytes.as_bytes(), i, Expiry::Never)
            .unwrap();
        assert_eq!(r.status, OpStatus::Stored, "insert {i} failed");
    }

    // give the periodic resize supervisor a chance to run too, not just the
    // op layer's synchronous escalation path.
    std::thread::sleep(Duration::from_millis(100));

    for i in 0..total {
        let r = h.get(format!("key-{i}").as_bytes()).unwrap();
        let v = r.value.unwrap_or_else(|| panic!("key-{i} missing after resize"));
        assert_eq!(&*v.bytes, format!("value-{i}").as_bytes());
        assert_eq!(v.flags, i);
    }

    h.shutdown();
}

#[test]
fn deleted_keys_stay_absent_across_resize() {
    let h = Handle::new(CacheConfig {
        initial_capacity_hint: 16,
        eviction_enabled: false,
        resize_check_interval: Duration::from_millis(10),
        eviction_threshold: 1,
    })
    .unwrap();

    for i in 0..500u32 {
        h.set(format!("k{i}").as_bytes(), b"v".as_slice(), 0, Expiry::Never)
            .unwrap();
    }
    for i in (0..500u32).step_by(2) {
        h.delete(format!("k{i}").as_bytes(), 0).unwrap();
    }

    std::thread::sleep(Duration::from_millis(60));

    for i in 0..500u32 {
        let present = h.get(format!("k{i}").as_bytes()).unwrap().value.is_some();
        assert_eq!(present, i % 2 == 1, "key k{i} presence mismatch after resize");
    }

    h.shutdown();
}
