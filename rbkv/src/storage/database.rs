//! High-level database interface.
//!
//! Provides the `init` and `open` entry points and a session type that wires
//! every key-value operation through the red-black engine.

use std::fs::File;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::config::StoreConfig;
use crate::storage::file::{FileError, NodeFile};
use crate::storage::io::NodeStore;
use crate::storage::record::Header;
use crate::storage::tree::{DuplicatePolicy, InsertOutcome, RbTree, TreeError, TreeStats};

/// An open storage file.
///
/// Holds an exclusive advisory lock on the file for as long as it lives.
/// The lock is released when the session is dropped or closed.
pub struct Database {
    file: NodeFile<File>,
    path: PathBuf,
    policy: DuplicatePolicy,
}

/// Whether `path` ends in a file-name component.
///
/// `Path::file_name` ignores a trailing separator, so `dir/sub/` has to be
/// caught on the raw string.
fn names_file(path: &Path) -> bool {
    path.file_name().is_some() && !path.to_string_lossy().ends_with(std::path::is_separator)
}

impl Database {
    /// Create an empty storage file at `path`.
    ///
    /// The path must name a file and must not already exist. Missing parent
    /// directories are created when `config.create_parent_dirs` is set.
    pub fn init(path: &Path, config: &StoreConfig) -> Result<(), DatabaseError> {
        if !names_file(path) {
            return Err(DatabaseError::Init(InitError::MissingFileName(
                path.to_path_buf(),
            )));
        }

        if config.create_parent_dirs {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::Init(InitError::CreateDirectory(parent.to_path_buf(), e))
                })?;
            }
        }

        NodeFile::create(path).map_err(|e| match e {
            FileError::AlreadyExists(p) => DatabaseError::Init(InitError::AlreadyExists(p)),
            other => DatabaseError::File(other),
        })?;

        tracing::info!(path = %path.display(), "initialized storage");
        Ok(())
    }

    /// Open an existing storage file and lock it for this session.
    pub fn open(path: &Path, config: &StoreConfig) -> Result<Self, DatabaseError> {
        if !path.is_file() {
            return Err(DatabaseError::NotFound(path.to_path_buf()));
        }

        let file = NodeFile::open(path)?;
        file.file().try_lock_exclusive().map_err(|e| {
            if e.kind() == fs2::lock_contended_error().kind() {
                DatabaseError::Locked(path.to_path_buf())
            } else {
                DatabaseError::File(FileError::Io(e))
            }
        })?;

        tracing::info!(path = %path.display(), policy = ?config.duplicate_policy, "opened storage");
        Ok(Self {
            file,
            path: path.to_path_buf(),
            policy: config.duplicate_policy,
        })
    }

    /// Path this session was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tree(&mut self) -> RbTree<'_, NodeFile<File>> {
        RbTree::with_policy(&mut self.file, self.policy)
    }

    /// The current file header.
    pub fn header(&mut self) -> Result<Header, DatabaseError> {
        Ok(self.tree().header()?)
    }

    /// Store `value` under `key`.
    pub fn set(&mut self, key: i32, value: i32) -> Result<InsertOutcome, DatabaseError> {
        Ok(self.tree().insert(key, value)?)
    }

    /// Value stored under `key`, if any.
    pub fn get(&mut self, key: i32) -> Result<Option<i32>, DatabaseError> {
        Ok(self.tree().find(key)?.map(|found| found.payload))
    }

    /// Remove `key`, returning the value it held.
    pub fn delete(&mut self, key: i32) -> Result<Option<i32>, DatabaseError> {
        Ok(self.tree().delete(key)?)
    }

    pub fn contains(&mut self, key: i32) -> Result<bool, DatabaseError> {
        Ok(self.tree().contains(key)?)
    }

    /// All keys in ascending order.
    pub fn keys(&mut self) -> Result<Vec<i32>, DatabaseError> {
        Ok(self.tree().keys()?)
    }

    /// All values, ordered by their keys.
    pub fn values(&mut self) -> Result<Vec<i32>, DatabaseError> {
        Ok(self.tree().values()?)
    }

    /// All `(key, value)` pairs in ascending key order.
    pub fn entries(&mut self) -> Result<Vec<(i32, i32)>, DatabaseError> {
        Ok(self.tree().entries()?)
    }

    pub fn len(&mut self) -> Result<usize, DatabaseError> {
        Ok(self.tree().len()?)
    }

    pub fn is_empty(&mut self) -> Result<bool, DatabaseError> {
        Ok(self.tree().is_empty()?)
    }

    /// Verify the tree's invariants.
    pub fn check(&mut self) -> Result<TreeStats, DatabaseError> {
        Ok(self.tree().check()?)
    }

    /// Flush and sync the file, then release the lock.
    pub fn close(mut self) -> Result<(), DatabaseError> {
        self.file
            .sync()
            .map_err(|e| DatabaseError::Tree(TreeError::Store(e)))?;
        self.file.sync_all()?;
        tracing::debug!(path = %self.path.display(), "closed storage");
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        // The advisory lock goes away with the file handle.
        if let Err(e) = self.file.sync() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to flush storage on drop");
        }
    }
}

/// Reasons `init` can refuse to create a storage file.
#[derive(Debug)]
pub enum InitError {
    /// Path has no file-name component.
    MissingFileName(PathBuf),
    /// A file already exists at the path.
    AlreadyExists(PathBuf),
    /// A parent directory could not be created.
    CreateDirectory(PathBuf, std::io::Error),
}

impl std::fmt::Display for InitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingFileName(p) => {
                write!(f, "storage name not specified in '{}'", p.display())
            }
            Self::AlreadyExists(p) => write!(f, "storage '{}' already exists", p.display()),
            Self::CreateDirectory(p, e) => {
                write!(f, "cannot create directory '{}': {e}", p.display())
            }
        }
    }
}

impl std::error::Error for InitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CreateDirectory(_, e) => Some(e),
            Self::MissingFileName(_) | Self::AlreadyExists(_) => None,
        }
    }
}

/// Errors that can occur during database operations.
#[derive(Debug)]
pub enum DatabaseError {
    /// Storage could not be initialized.
    Init(InitError),
    /// Storage file does not exist.
    NotFound(PathBuf),
    /// Another session holds the storage lock.
    Locked(PathBuf),
    /// File I/O error.
    File(FileError),
    /// Tree error.
    Tree(TreeError),
}

impl std::fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init(e) => write!(f, "init error: {e}"),
            Self::NotFound(p) => write!(f, "storage '{}' not found", p.display()),
            Self::Locked(p) => write!(f, "storage '{}' is locked by another process", p.display()),
            Self::File(e) => write!(f, "file error: {e}"),
            Self::Tree(e) => write!(f, "tree error: {e}"),
        }
    }
}

impl std::error::Error for DatabaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Init(e) => Some(e),
            Self::File(e) => Some(e),
            Self::Tree(e) => Some(e),
            Self::NotFound(_) | Self::Locked(_) => None,
        }
    }
}

impl From<FileError> for DatabaseError {
    fn from(e: FileError) -> Self {
        Self::File(e)
    }
}

impl From<TreeError> for DatabaseError {
    fn from(e: TreeError) -> Self {
        Self::Tree(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn config() -> StoreConfig {
        StoreConfig::default()
    }

    #[test]
    fn test_init_writes_empty_header() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("store.rbkv");

        Database::init(&path, &config()).expect("init");
        assert_eq!(
            fs::read(&path).expect("read"),
            vec![0, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF]
        );

        let mut db = Database::open(&path, &config()).expect("open");
        assert_eq!(db.header().expect("header"), Header::empty());
        assert!(db.is_empty().expect("is_empty"));
    }

    #[test]
    fn test_init_existing_path_fails() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("store.rbkv");
        Database::init(&path, &config()).expect("init");

        let result = Database::init(&path, &config());
        assert!(matches!(
            result,
            Err(DatabaseError::Init(InitError::AlreadyExists(_)))
        ));
    }

    #[test]
    fn test_init_without_file_name_fails() {
        let result = Database::init(Path::new("/"), &config());
        assert!(matches!(
            result,
            Err(DatabaseError::Init(InitError::MissingFileName(_)))
        ));
    }

    #[test]
    fn test_init_trailing_separator_fails() {
        let dir = tempdir().expect("create temp dir");
        let mut raw = dir.path().join("sub").into_os_string();
        raw.push(std::path::MAIN_SEPARATOR_STR);
        let path = PathBuf::from(raw);

        let result = Database::init(&path, &config());
        assert!(matches!(
            result,
            Err(DatabaseError::Init(InitError::MissingFileName(_)))
        ));
        assert!(!dir.path().join("sub").exists());
    }

    #[test]
    fn test_init_creates_parent_directories() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("a").join("b").join("store.rbkv");

        Database::init(&path, &config()).expect("init");
        assert!(path.is_file());
    }

    #[test]
    fn test_init_without_parent_creation() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("missing").join("store.rbkv");
        let config = StoreConfig {
            create_parent_dirs: false,
            ..StoreConfig::default()
        };

        let result = Database::init(&path, &config);
        assert!(matches!(result, Err(DatabaseError::File(FileError::Io(_)))));
    }

    #[test]
    fn test_open_missing_fails() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("absent.rbkv");
        assert!(matches!(
            Database::open(&path, &config()),
            Err(DatabaseError::NotFound(_))
        ));
    }

    #[test]
    fn test_second_open_is_locked() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("store.rbkv");
        Database::init(&path, &config()).expect("init");

        let db = Database::open(&path, &config()).expect("open");
        assert!(matches!(
            Database::open(&path, &config()),
            Err(DatabaseError::Locked(_))
        ));

        db.close().expect("close");
        Database::open(&path, &config()).expect("reopen after close");
    }

    #[test]
    fn test_session_operations() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("store.rbkv");
        Database::init(&path, &config()).expect("init");
        let mut db = Database::open(&path, &config()).expect("open");
        assert_eq!(db.path(), path);

        for (key, value) in [(5, 50), (3, 30), (8, 80), (1, 10)] {
            db.set(key, value).expect("set");
        }

        assert_eq!(db.get(3).expect("get"), Some(30));
        assert_eq!(db.get(4).expect("get"), None);
        assert!(db.contains(8).expect("contains"));
        assert!(!db.contains(9).expect("contains"));
        assert_eq!(db.keys().expect("keys"), vec![1, 3, 5, 8]);
        assert_eq!(db.values().expect("values"), vec![10, 30, 50, 80]);
        assert_eq!(db.len().expect("len"), 4);

        assert_eq!(db.delete(5).expect("delete"), Some(50));
        assert_eq!(db.delete(5).expect("delete again"), None);
        assert_eq!(db.entries().expect("entries"), vec![(1, 10), (3, 30), (8, 80)]);
        assert_eq!(db.check().expect("check").nodes, 3);
    }

    #[test]
    fn test_reject_policy_from_config() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("store.rbkv");
        let config = StoreConfig {
            duplicate_policy: DuplicatePolicy::Reject,
            ..StoreConfig::default()
        };
        Database::init(&path, &config).expect("init");
        let mut db = Database::open(&path, &config).expect("open");

        db.set(1, 1).expect("set");
        assert!(matches!(
            db.set(1, 2),
            Err(DatabaseError::Tree(TreeError::DuplicateKey(1)))
        ));
        assert_eq!(db.get(1).expect("get"), Some(1));
    }
}
