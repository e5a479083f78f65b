//! Record store abstraction.
//!
//! The `NodeStore` trait is the only path from the tree engine to persisted
//! bytes. There is no caching behind it: every call performs its own I/O, so
//! a field written by one call is visible to the next read.

use crate::storage::node::NodeRef;
use crate::storage::record::{Field, Header, NodeRecord, RecordError};

/// Errors that can occur during record store operations.
#[derive(Debug)]
pub enum StoreError {
    /// I/O error.
    Io(std::io::Error),
    /// A stored record could not be decoded.
    Record(RecordError),
    /// A write targeted a slot outside `[0, node_count]`.
    SlotOutOfBounds { index: i32, node_count: u32 },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Record(e) => write!(f, "record error: {e}"),
            Self::SlotOutOfBounds { index, node_count } => {
                write!(f, "slot {index} out of bounds (node count: {node_count})")
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Record(e) => Some(e),
            Self::SlotOutOfBounds { .. } => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<RecordError> for StoreError {
    fn from(e: RecordError) -> Self {
        Self::Record(e)
    }
}

/// Positional access to the header and node records.
///
/// # Implementation Notes
///
/// Implementations must ensure:
/// - `read_node` returns `None` for the sentinel and for any index at or past
///   the current `node_count`, never an error
/// - `write_node` accepts the slot at `node_count` so a new record can be
///   written before the count is bumped
/// - every write is visible to the next read without an explicit flush
pub trait NodeStore {
    /// Read the file header.
    fn read_header(&mut self) -> Result<Header, StoreError>;

    /// Overwrite the `node_count` header field.
    fn write_node_count(&mut self, node_count: u32) -> Result<(), StoreError>;

    /// Overwrite the `root_index` header field.
    fn write_root_index(&mut self, root: NodeRef) -> Result<(), StoreError>;

    /// Read the record at `node`.
    fn read_node(&mut self, node: NodeRef) -> Result<Option<NodeRecord>, StoreError>;

    /// Write a whole record to the slot named by its `self_index`.
    fn write_node(&mut self, record: &NodeRecord) -> Result<(), StoreError>;

    /// Overwrite a single field of the record at `node`.
    ///
    /// Patching the sentinel is a no-op.
    fn patch_field(&mut self, node: NodeRef, field: Field) -> Result<(), StoreError>;

    /// Flush buffered writes to the underlying stream.
    fn sync(&mut self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let e = StoreError::SlotOutOfBounds {
            index: 10,
            node_count: 5,
        };
        assert!(e.to_string().contains("slot 10"));
        assert!(e.to_string().contains("node count: 5"));

        let e = StoreError::Record(RecordError::InvalidColor { index: 2, byte: 9 });
        assert!(e.to_string().contains("record 2"));
    }
}
