//! Test deletes across sessions.

use crate::e2e_tests::helpers::TestStore;

#[test]
fn test_deleted_keys_stay_deleted_after_reopen() {
    let store = TestStore::new();

    store.session(|db| {
        for key in 0..64 {
            db.set(key, key * 2).expect("set");
        }
        for key in (0..64).filter(|k| k % 3 == 0) {
            assert_eq!(db.delete(key).expect("delete"), Some(key * 2));
        }
    });

    store.session(|db| {
        for key in 0..64 {
            let expected = (key % 3 != 0).then_some(key * 2);
            assert_eq!(db.get(key).expect("get"), expected, "key {key}");
        }
        db.check().expect("check");
    });
}

#[test]
fn test_delete_missing_leaves_file_untouched() {
    let store = TestStore::new();
    store.session(|db| {
        for key in [4, 2, 6, 1, 3, 5, 7] {
            db.set(key, key).expect("set");
        }
    });
    let before = store.bytes();

    store.session(|db| {
        assert_eq!(db.delete(100).expect("delete"), None);
        assert_eq!(db.delete(-1).expect("delete"), None);
    });

    assert_eq!(before, store.bytes());
}

#[test]
fn test_delete_root_repeatedly() {
    let store = TestStore::new();
    store.session(|db| {
        for key in 0..32 {
            db.set(key, -key).expect("set");
        }
    });

    for remaining in (0..32).rev() {
        let root = store.raw_header().root().slot().expect("live root");
        let root_key = store.raw_record(root).order_key;
        store.session(|db| {
            assert_eq!(db.delete(root_key).expect("delete"), Some(-root_key));
            assert_eq!(db.len().expect("len"), remaining);
            db.check().expect("check");
        });
    }
    assert!(store.raw_header().root().is_nil());
}
