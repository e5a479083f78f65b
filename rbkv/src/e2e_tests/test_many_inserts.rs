//! Test a large shuffled workload against the file.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::e2e_tests::helpers::TestStore;

#[test]
fn test_many_shuffled_inserts() {
    let store = TestStore::new();
    let mut keys: Vec<i32> = (0..2000).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(42));

    store.session(|db| {
        for &key in &keys {
            db.set(key, key ^ 0x55).expect("set");
        }
    });

    assert_eq!(store.raw_header().node_count, 2000);
    assert_eq!(store.bytes().len(), 8 + 2000 * 25);

    store.session(|db| {
        let stats = db.check().expect("check");
        assert_eq!(stats.nodes, 2000);
        // 2 * log2(2001)
        assert!(stats.depth <= 22, "depth {}", stats.depth);
        assert_eq!(db.keys().expect("keys"), (0..2000).collect::<Vec<_>>());
        assert!(
            db.entries()
                .expect("entries")
                .iter()
                .all(|&(key, value)| value == key ^ 0x55)
        );
    });
}
