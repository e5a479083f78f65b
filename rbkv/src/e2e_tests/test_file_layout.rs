//! Test the exact bytes written for a small tree.

use crate::e2e_tests::helpers::TestStore;
use crate::config::StoreConfig;
use crate::storage::{Color, DatabaseError, DuplicatePolicy, NodeRef, TreeError};

#[test]
fn test_three_ascending_keys_rotate_root() {
    let store = TestStore::new();

    store.session(|db| {
        for (key, value) in [(10, 100), (20, 200), (30, 300)] {
            db.set(key, value).expect("set");
        }
    });

    let bytes = store.bytes();
    assert_eq!(bytes.len(), 8 + 3 * 25);
    assert_eq!(&bytes[..8], &[0, 0, 0, 3, 0, 0, 0, 1]);

    let root = store.raw_record(1);
    assert_eq!(root.color, Color::Black);
    assert_eq!(root.order_key, 20);
    assert_eq!(root.payload, 200);
    assert_eq!(root.left, NodeRef::new(0));
    assert_eq!(root.right, NodeRef::new(2));
    assert!(root.parent.is_nil());

    for (index, key) in [(0, 10), (2, 30)] {
        let leaf = store.raw_record(index);
        assert_eq!(leaf.color, Color::Red);
        assert_eq!(leaf.order_key, key);
        assert_eq!(leaf.parent, NodeRef::new(1));
        assert!(leaf.left.is_nil());
        assert!(leaf.right.is_nil());
    }
}

#[test]
fn test_record_bytes_are_big_endian() {
    let store = TestStore::new();
    store.session(|db| {
        db.set(-2, 0x0102_0304).expect("set");
    });

    let bytes = store.bytes();
    let record = &bytes[8..33];
    assert_eq!(&record[0..4], &[0, 0, 0, 0]);
    assert_eq!(&record[4..16], &[0xFF; 12]);
    // A lone root is recolored black.
    assert_eq!(record[16], 0);
    assert_eq!(&record[17..21], &[0xFF, 0xFF, 0xFF, 0xFE]);
    assert_eq!(&record[21..25], &[1, 2, 3, 4]);
}

#[test]
fn test_upsert_patches_payload_only() {
    let store = TestStore::new();
    store.session(|db| {
        db.set(1, 1).expect("set");
        db.set(2, 2).expect("set");
    });
    let before = store.bytes();

    store.session(|db| {
        db.set(2, 9).expect("upsert");
    });
    let after = store.bytes();

    assert_eq!(before.len(), after.len());
    let changed: Vec<usize> = (0..before.len())
        .filter(|&i| before[i] != after[i])
        .collect();
    // Only the last byte of the second record's payload differs.
    assert_eq!(changed, vec![8 + 25 + 24]);
}

#[test]
fn test_rejected_duplicate_writes_nothing() {
    let store = TestStore::with_config(StoreConfig {
        duplicate_policy: DuplicatePolicy::Reject,
        ..StoreConfig::default()
    });
    store.session(|db| {
        db.set(5, 50).expect("set");
    });
    let before = store.bytes();

    store.session(|db| {
        assert!(matches!(
            db.set(5, 51),
            Err(DatabaseError::Tree(TreeError::DuplicateKey(5)))
        ));
    });

    assert_eq!(before, store.bytes());
}
