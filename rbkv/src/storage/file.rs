//! Storage file I/O operations.
//!
//! This module handles positional reads and writes of the header and node
//! records. Every operation seeks to its own offset first.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::storage::io::{NodeStore, StoreError};
use crate::storage::node::NodeRef;
use crate::storage::record::{
    Field, Header, NodeRecord, RecordError, file_len_for, record_offset,
};

/// A node file over any seekable byte stream.
///
/// Production code uses a `std::fs::File`; tests can use an in-memory
/// `std::io::Cursor<Vec<u8>>`.
pub struct NodeFile<F: Read + Write + Seek = File> {
    inner: F,
}

impl NodeFile<File> {
    /// Create a new storage file at the given path.
    ///
    /// Returns an error if the file already exists.
    pub fn create(path: &Path) -> Result<Self, FileError> {
        if path.exists() {
            return Err(FileError::AlreadyExists(path.to_path_buf()));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    FileError::AlreadyExists(path.to_path_buf())
                } else {
                    FileError::Io(e)
                }
            })?;

        let node_file = Self::format(file)?;
        node_file.sync_all()?;
        Ok(node_file)
    }

    /// Open an existing storage file.
    pub fn open(path: &Path) -> Result<Self, FileError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(FileError::Io)?;

        Self::from_stream(file)
    }

    /// Get a reference to the underlying file handle.
    #[must_use]
    pub const fn file(&self) -> &File {
        &self.inner
    }

    /// Sync all pending writes to disk.
    pub fn sync_all(&self) -> Result<(), FileError> {
        self.inner.sync_all().map_err(FileError::Io)
    }
}

impl<F: Read + Write + Seek> NodeFile<F> {
    /// Write an empty header to the start of `inner`.
    pub fn format(mut inner: F) -> Result<Self, FileError> {
        inner.seek(SeekFrom::Start(0)).map_err(FileError::Io)?;
        inner
            .write_all(&Header::empty().to_bytes())
            .map_err(FileError::Io)?;
        inner.flush().map_err(FileError::Io)?;
        Ok(Self { inner })
    }

    /// Wrap a stream that already holds a storage file.
    ///
    /// Validates that the stream is long enough for the header and for every
    /// record the header claims.
    pub fn from_stream(mut inner: F) -> Result<Self, FileError> {
        let len = inner.seek(SeekFrom::End(0)).map_err(FileError::Io)?;
        if len < Header::SIZE as u64 {
            return Err(FileError::Truncated {
                expected: Header::SIZE as u64,
                actual: len,
            });
        }

        let mut node_file = Self { inner };
        let header = node_file.read_header_raw()?;
        let expected = file_len_for(header.node_count);
        if len < expected {
            return Err(FileError::Truncated {
                expected,
                actual: len,
            });
        }

        Ok(node_file)
    }

    /// Unwrap the underlying stream.
    pub fn into_inner(self) -> F {
        self.inner
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.read_exact(buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> std::io::Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.write_all(buf)
    }

    fn read_header_raw(&mut self) -> Result<Header, FileError> {
        let mut buf = [0u8; Header::SIZE];
        self.read_at(0, &mut buf).map_err(FileError::Io)?;
        Header::from_bytes(&buf).map_err(FileError::Record)
    }

    /// Resolve a node to its slot if it lies below `limit`.
    fn slot_within(node: NodeRef, limit: u32) -> Option<u32> {
        node.slot().filter(|&slot| slot < limit)
    }
}

impl<F: Read + Write + Seek> NodeStore for NodeFile<F> {
    fn read_header(&mut self) -> Result<Header, StoreError> {
        let mut buf = [0u8; Header::SIZE];
        self.read_at(0, &mut buf)?;
        Ok(Header::from_bytes(&buf)?)
    }

    fn write_node_count(&mut self, node_count: u32) -> Result<(), StoreError> {
        self.write_at(Header::NODE_COUNT_OFFSET, &node_count.to_be_bytes())?;
        Ok(())
    }

    fn write_root_index(&mut self, root: NodeRef) -> Result<(), StoreError> {
        self.write_at(Header::ROOT_INDEX_OFFSET, &root.index().to_be_bytes())?;
        Ok(())
    }

    fn read_node(&mut self, node: NodeRef) -> Result<Option<NodeRecord>, StoreError> {
        if node.is_nil() {
            return Ok(None);
        }

        let header = self.read_header()?;
        let Some(slot) = Self::slot_within(node, header.node_count) else {
            return Ok(None);
        };

        let mut buf = [0u8; NodeRecord::SIZE];
        self.read_at(record_offset(slot), &mut buf)?;
        Ok(Some(NodeRecord::from_bytes(&buf, node)?))
    }

    fn write_node(&mut self, record: &NodeRecord) -> Result<(), StoreError> {
        let header = self.read_header()?;
        // The slot at `node_count` is the next allocation and may be written.
        let slot = Self::slot_within(record.self_index, header.node_count.saturating_add(1))
            .ok_or(StoreError::SlotOutOfBounds {
                index: record.self_index.index(),
                node_count: header.node_count,
            })?;

        self.write_at(record_offset(slot), &record.to_bytes())?;
        Ok(())
    }

    fn patch_field(&mut self, node: NodeRef, field: Field) -> Result<(), StoreError> {
        if node.is_nil() {
            return Ok(());
        }

        let header = self.read_header()?;
        let slot = Self::slot_within(node, header.node_count).ok_or(
            StoreError::SlotOutOfBounds {
                index: node.index(),
                node_count: header.node_count,
            },
        )?;

        let offset = record_offset(slot) + field.offset() as u64;
        self.write_at(offset, field.to_bytes().as_ref())?;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StoreError> {
        self.inner.flush()?;
        Ok(())
    }
}

/// Errors that can occur while creating or opening a storage file.
#[derive(Debug)]
pub enum FileError {
    /// I/O error.
    Io(std::io::Error),
    /// File already exists.
    AlreadyExists(PathBuf),
    /// The header could not be decoded.
    Record(RecordError),
    /// File is shorter than its header claims.
    Truncated { expected: u64, actual: u64 },
}

impl std::fmt::Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::AlreadyExists(p) => write!(f, "file already exists: {}", p.display()),
            Self::Record(e) => write!(f, "header error: {e}"),
            Self::Truncated { expected, actual } => {
                write!(
                    f,
                    "file truncated: expected at least {expected} bytes, found {actual}"
                )
            }
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Record(e) => Some(e),
            Self::AlreadyExists(_) | Self::Truncated { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::node::Color;
    use std::fs;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn memory_file() -> NodeFile<Cursor<Vec<u8>>> {
        NodeFile::format(Cursor::new(Vec::new())).expect("format")
    }

    /// Append a record at the next slot and bump the count.
    fn push(file: &mut NodeFile<Cursor<Vec<u8>>>, order_key: i32) -> NodeRef {
        let header = file.read_header().expect("header");
        let node = NodeRef::new(i32::try_from(header.node_count).expect("index"));
        file.write_node(&NodeRecord::new(node, Color::Red, order_key, order_key * 10))
            .expect("write node");
        file.write_node_count(header.node_count + 1)
            .expect("write count");
        node
    }

    #[test]
    fn test_create_and_open() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.rbkv");

        {
            let mut file = NodeFile::create(&path).expect("create");
            assert_eq!(file.read_header().expect("header"), Header::empty());
        }

        assert_eq!(fs::read(&path).expect("read bytes").len(), Header::SIZE);

        let mut file = NodeFile::open(&path).expect("open");
        assert_eq!(file.read_header().expect("header"), Header::empty());
    }

    #[test]
    fn test_create_already_exists() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.rbkv");
        fs::write(&path, b"existing").expect("write file");

        let result = NodeFile::create(&path);
        assert!(matches!(result, Err(FileError::AlreadyExists(_))));
    }

    #[test]
    fn test_open_truncated() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("short.rbkv");
        fs::write(&path, [0u8, 0]).expect("write file");
        assert!(matches!(
            NodeFile::open(&path),
            Err(FileError::Truncated { expected: 8, actual: 2 })
        ));

        // Header claims two records but none follow.
        let mut bytes = Header::empty().to_bytes().to_vec();
        bytes[0..4].copy_from_slice(&2u32.to_be_bytes());
        assert!(matches!(
            NodeFile::from_stream(Cursor::new(bytes)),
            Err(FileError::Truncated {
                expected: 58,
                actual: 8
            })
        ));
    }

    #[test]
    fn test_read_node_out_of_range_is_sentinel() {
        let mut file = memory_file();
        assert_eq!(file.read_node(NodeRef::NIL).expect("read"), None);
        assert_eq!(file.read_node(NodeRef::new(0)).expect("read"), None);

        let node = push(&mut file, 4);
        assert!(file.read_node(node).expect("read").is_some());
        assert_eq!(file.read_node(NodeRef::new(1)).expect("read"), None);
    }

    #[test]
    fn test_header_field_writes() {
        let mut file = memory_file();
        file.write_node_count(3).expect("count");
        file.write_root_index(NodeRef::new(2)).expect("root");

        let header = file.read_header().expect("header");
        assert_eq!(header.node_count, 3);
        assert_eq!(header.root(), NodeRef::new(2));
    }

    #[test]
    fn test_patch_field_touches_only_that_field() {
        let mut file = memory_file();
        let a = push(&mut file, 1);
        let b = push(&mut file, 2);

        let before = file.read_node(b).expect("read").expect("some");
        file.patch_field(a, Field::Right(b)).expect("patch right");
        file.patch_field(a, Field::Color(Color::Black))
            .expect("patch color");
        file.patch_field(a, Field::Payload(-99)).expect("patch payload");

        let record = file.read_node(a).expect("read").expect("some");
        assert_eq!(record.right, b);
        assert_eq!(record.left, NodeRef::NIL);
        assert_eq!(record.parent, NodeRef::NIL);
        assert_eq!(record.color, Color::Black);
        assert_eq!(record.order_key, 1);
        assert_eq!(record.payload, -99);

        // Neighbouring record is untouched.
        assert_eq!(file.read_node(b).expect("read"), Some(before));
    }

    #[test]
    fn test_patch_sentinel_is_noop() {
        let mut file = memory_file();
        push(&mut file, 1);
        let before = file.into_inner().into_inner();

        let mut file = NodeFile::from_stream(Cursor::new(before.clone())).expect("reopen");
        file.patch_field(NodeRef::NIL, Field::Color(Color::Red))
            .expect("patch nil");
        assert_eq!(file.into_inner().into_inner(), before);
    }

    #[test]
    fn test_write_out_of_bounds() {
        let mut file = memory_file();
        let far = NodeRecord::new(NodeRef::new(5), Color::Red, 0, 0);
        assert!(matches!(
            file.write_node(&far),
            Err(StoreError::SlotOutOfBounds { index: 5, node_count: 0 })
        ));
        assert!(matches!(
            file.patch_field(NodeRef::new(0), Field::Payload(1)),
            Err(StoreError::SlotOutOfBounds { index: 0, node_count: 0 })
        ));
    }

    #[test]
    fn test_records_persist_across_reopen() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.rbkv");

        {
            let mut file = NodeFile::create(&path).expect("create");
            let record = NodeRecord::new(NodeRef::new(0), Color::Black, 7, 70);
            file.write_node(&record).expect("write");
            file.write_node_count(1).expect("count");
            file.write_root_index(NodeRef::new(0)).expect("root");
            file.sync_all().expect("sync");
        }

        let mut file = NodeFile::open(&path).expect("open");
        let record = file.read_node(NodeRef::new(0)).expect("read").expect("some");
        assert_eq!(record.order_key, 7);
        assert_eq!(record.payload, 70);
        assert_eq!(record.color, Color::Black);
        assert_eq!(file.read_header().expect("header").root(), NodeRef::new(0));
    }
}
