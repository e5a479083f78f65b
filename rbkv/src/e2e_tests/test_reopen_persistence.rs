//! Test that a closed store reads back identically in a new session.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::e2e_tests::helpers::TestStore;

#[test]
fn test_reopen_preserves_bytes_and_lookups() {
    let store = TestStore::new();
    let mut rng = StdRng::seed_from_u64(7);
    let pairs: Vec<(i32, i32)> = (0..200)
        .map(|_| (rng.random_range(-500..500), rng.random()))
        .collect();

    let lookups: Vec<Option<i32>> = store.session(|db| {
        for &(key, value) in &pairs {
            db.set(key, value).expect("set");
        }
        (-500..500).map(|key| db.get(key).expect("get")).collect()
    });
    let bytes = store.bytes();

    let reopened: Vec<Option<i32>> =
        store.session(|db| (-500..500).map(|key| db.get(key).expect("get")).collect());

    assert_eq!(lookups, reopened);
    assert_eq!(bytes, store.bytes(), "read-only session changed the file");
    store.session(|db| {
        db.check().expect("check");
    });
}

#[test]
fn test_sessions_accumulate() {
    let store = TestStore::new();

    for round in 0..5 {
        store.session(|db| {
            for i in 0..10 {
                db.set(round * 10 + i, round).expect("set");
            }
        });
    }

    store.session(|db| {
        assert_eq!(db.len().expect("len"), 50);
        assert_eq!(db.keys().expect("keys"), (0..50).collect::<Vec<_>>());
        assert_eq!(db.get(37).expect("get"), Some(3));
    });
}
