//! Test operations against a store with no records.

use crate::e2e_tests::helpers::TestStore;
use crate::storage::Header;

#[test]
fn test_queries_on_empty_store() {
    let store = TestStore::new();

    store.session(|db| {
        assert_eq!(db.get(0).expect("get"), None);
        assert!(!db.contains(i32::MIN).expect("contains"));
        assert!(db.keys().expect("keys").is_empty());
        assert!(db.values().expect("values").is_empty());
        assert_eq!(db.delete(7).expect("delete"), None);
        assert_eq!(db.check().expect("check").nodes, 0);
    });

    assert_eq!(store.raw_header(), Header::empty());
    assert_eq!(store.bytes().len(), Header::SIZE);
}

#[test]
fn test_store_emptied_by_deletes() {
    let store = TestStore::new();

    store.session(|db| {
        db.set(1, 10).expect("set");
        db.set(2, 20).expect("set");
        db.delete(1).expect("delete");
        db.delete(2).expect("delete");
        assert!(db.is_empty().expect("is_empty"));
    });

    let header = store.raw_header();
    assert!(header.root().is_nil());
    // Slots stay allocated after their nodes are unlinked.
    assert_eq!(header.node_count, 2);

    store.session(|db| {
        db.set(3, 30).expect("set");
        assert_eq!(db.entries().expect("entries"), vec![(3, 30)]);
    });
    assert_eq!(store.raw_header().node_count, 3);
    assert_eq!(store.raw_header().root().index(), 2);
}
