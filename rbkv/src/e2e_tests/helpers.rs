//! Common helpers for end-to-end tests.

use std::path::PathBuf;

use tempfile::TempDir;

use crate::config::StoreConfig;
use crate::storage::{Database, Header, NodeRecord, NodeRef, record_offset};

/// A freshly initialized storage file that is removed on drop.
pub struct TestStore {
    // Held for its drop.
    _dir: TempDir,
    path: PathBuf,
    pub config: StoreConfig,
}

impl TestStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    #[must_use]
    pub fn with_config(config: StoreConfig) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("store.rbkv");
        Database::init(&path, &config).expect("Failed to init storage");
        Self {
            _dir: dir,
            path,
            config,
        }
    }

    /// Open a new session.
    pub fn open(&self) -> Database {
        Database::open(&self.path, &self.config).expect("Failed to open storage")
    }

    /// Run `f` in a session and close it afterwards.
    pub fn session<T>(&self, f: impl FnOnce(&mut Database) -> T) -> T {
        let mut db = self.open();
        let result = f(&mut db);
        db.close().expect("Failed to close storage");
        result
    }

    pub fn bytes(&self) -> Vec<u8> {
        std::fs::read(&self.path).expect("Failed to read storage")
    }

    /// Header parsed straight from the file bytes.
    pub fn raw_header(&self) -> Header {
        Header::from_bytes(&self.bytes()).expect("Failed to parse header")
    }

    /// Record `index` parsed straight from the file bytes.
    pub fn raw_record(&self, index: u32) -> NodeRecord {
        let bytes = self.bytes();
        let start = usize::try_from(record_offset(index)).expect("offset fits usize");
        let expected = NodeRef::new(i32::try_from(index).expect("index fits i32"));
        NodeRecord::from_bytes(&bytes[start..start + NodeRecord::SIZE], expected)
            .expect("Failed to parse record")
    }
}
