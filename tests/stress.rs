//! Randomized workload stress test: a mixed sequence of random ops against
//! a small table, checked against a reference `HashMap` oracle. Distinct
//! from the `quickcheck` properties in that it drives one long sequence of
//! dependent operations rather than many independent single-shot cases.

use std::collections::HashMap;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use cuckoo_cache::{CacheConfig, Expiry, Handle, OpStatus};

#[test]
fn random_set_delete_workload_matches_oracle() {
    let h = Handle::new(CacheConfig {
        initial_capacity_hint: 64,
        eviction_enabled: false,
        resize_check_interval: Duration::from_secs(3600),
        eviction_threshold: 1,
    })
    .unwrap();

    let mut oracle: HashMap<u32, Vec<u8>> = HashMap::new();
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);

    for _ in 0..5000 {
        let key_id = rng.gen_range(0..200u32);
        let key = format!("k{key_id}").into_bytes();

        if rng.gen_bool(0.7) {
            let len = rng.gen_range(0..16);
            let value: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let r = h.set(&key, value.as_slice(), 0, Expiry::Never).unwrap();
            assert_eq!(r.status, OpStatus::Stored);
            oracle.insert(key_id, value);
        } else {
            h.delete(&key, 0).unwrap();
            oracle.remove(&key_id);
        }
    }

    for (key_id, expected) in &oracle {
        let key = format!("k{key_id}").into_bytes();
        let got = h.get(&key).unwrap().value;
        assert_eq!(got.map(|v| v.bytes.to_vec()), Some(expected.clone()));
    }

    for key_id in 0..200u32 {
        if !oracle.contains_key(&key_id) {
            let key = format!("k{key_id}").into_bytes();
            assert!(h.get(&key).unwrap().value.is_none());
        }
    }
}
