//! Fixed-width binary layout of the storage file.
//!
//! The file starts with an 8-byte header followed by a dense array of 25-byte
//! node records. All integers are big-endian.
//!
//! Header layout:
//! - `node_count`: 4 bytes (number of allocated record slots)
//! - `root_index`: 4 bytes (signed, -1 for an empty tree)
//!
//! Record layout:
//! - `self_index`: 4 bytes
//! - `left_index`: 4 bytes
//! - `right_index`: 4 bytes
//! - `parent_index`: 4 bytes
//! - `color`: 1 byte (1 = Red, 0 = Black)
//! - `order_key`: 4 bytes
//! - `payload`: 4 bytes

use crate::storage::node::{Color, NodeRef};

/// Record field offsets, relative to the start of a record.
mod offsets {
    pub const SELF_INDEX: usize = 0;
    pub const LEFT: usize = 4;
    pub const RIGHT: usize = 8;
    pub const PARENT: usize = 12;
    pub const COLOR: usize = 16;
    pub const ORDER_KEY: usize = 17;
    pub const PAYLOAD: usize = 21;
}

/// Header field offsets, relative to the start of the file.
mod header_offsets {
    pub const NODE_COUNT: u64 = 0;
    pub const ROOT_INDEX: u64 = 4;
}

/// The file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Number of allocated record slots. Also the index of the next allocation.
    pub node_count: u32,
    /// Record index of the tree root, or -1 when the tree is empty.
    pub root_index: i32,
}

impl Header {
    /// Size of the encoded header in bytes.
    pub const SIZE: usize = 8;

    /// File offset of the `node_count` field.
    pub const NODE_COUNT_OFFSET: u64 = header_offsets::NODE_COUNT;

    /// File offset of the `root_index` field.
    pub const ROOT_INDEX_OFFSET: u64 = header_offsets::ROOT_INDEX;

    /// Header of a freshly initialized store.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            node_count: 0,
            root_index: NodeRef::NIL.index(),
        }
    }

    /// The root as a node handle.
    #[must_use]
    pub const fn root(&self) -> NodeRef {
        NodeRef::new(self.root_index)
    }

    #[must_use]
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.node_count.to_be_bytes());
        buf[4..8].copy_from_slice(&self.root_index.to_be_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() < Self::SIZE {
            return Err(RecordError::ShortBuffer {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            node_count: u32::from_be_bytes(read_array(bytes, 0)),
            root_index: i32::from_be_bytes(read_array(bytes, 4)),
        })
    }
}

/// One persisted tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRecord {
    pub self_index: NodeRef,
    pub left: NodeRef,
    pub right: NodeRef,
    pub parent: NodeRef,
    pub color: Color,
    pub order_key: i32,
    pub payload: i32,
}

impl NodeRecord {
    /// Size of an encoded record in bytes.
    pub const SIZE: usize = 25;

    /// A detached node with no links.
    #[must_use]
    pub const fn new(self_index: NodeRef, color: Color, order_key: i32, payload: i32) -> Self {
        Self {
            self_index,
            left: NodeRef::NIL,
            right: NodeRef::NIL,
            parent: NodeRef::NIL,
            color,
            order_key,
            payload,
        }
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[offsets::SELF_INDEX..offsets::LEFT]
            .copy_from_slice(&self.self_index.index().to_be_bytes());
        buf[offsets::LEFT..offsets::RIGHT].copy_from_slice(&self.left.index().to_be_bytes());
        buf[offsets::RIGHT..offsets::PARENT].copy_from_slice(&self.right.index().to_be_bytes());
        buf[offsets::PARENT..offsets::COLOR].copy_from_slice(&self.parent.index().to_be_bytes());
        buf[offsets::COLOR] = self.color.to_byte();
        buf[offsets::ORDER_KEY..offsets::PAYLOAD].copy_from_slice(&self.order_key.to_be_bytes());
        buf[offsets::PAYLOAD..Self::SIZE].copy_from_slice(&self.payload.to_be_bytes());
        buf
    }

    /// Decode a record that was read from slot `expected_index`.
    ///
    /// The stored `self_index` must match the slot it was read from.
    pub fn from_bytes(bytes: &[u8], expected_index: NodeRef) -> Result<Self, RecordError> {
        if bytes.len() < Self::SIZE {
            return Err(RecordError::ShortBuffer {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }

        let self_index = NodeRef::new(i32::from_be_bytes(read_array(bytes, offsets::SELF_INDEX)));
        if self_index != expected_index {
            return Err(RecordError::IndexMismatch {
                slot: expected_index.index(),
                stored: self_index.index(),
            });
        }

        let color = Color::from_byte(bytes[offsets::COLOR]).ok_or(RecordError::InvalidColor {
            index: self_index.index(),
            byte: bytes[offsets::COLOR],
        })?;

        Ok(Self {
            self_index,
            left: NodeRef::new(i32::from_be_bytes(read_array(bytes, offsets::LEFT))),
            right: NodeRef::new(i32::from_be_bytes(read_array(bytes, offsets::RIGHT))),
            parent: NodeRef::new(i32::from_be_bytes(read_array(bytes, offsets::PARENT))),
            color,
            order_key: i32::from_be_bytes(read_array(bytes, offsets::ORDER_KEY)),
            payload: i32::from_be_bytes(read_array(bytes, offsets::PAYLOAD)),
        })
    }
}

/// A single record field together with its new value.
///
/// Used for targeted writes that touch one field without rewriting the
/// whole record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Left(NodeRef),
    Right(NodeRef),
    Parent(NodeRef),
    Color(Color),
    OrderKey(i32),
    Payload(i32),
}

impl Field {
    /// Offset of this field within a record.
    #[must_use]
    pub const fn offset(&self) -> usize {
        match self {
            Self::Left(_) => offsets::LEFT,
            Self::Right(_) => offsets::RIGHT,
            Self::Parent(_) => offsets::PARENT,
            Self::Color(_) => offsets::COLOR,
            Self::OrderKey(_) => offsets::ORDER_KEY,
            Self::Payload(_) => offsets::PAYLOAD,
        }
    }

    /// Encoded bytes of the new value.
    #[must_use]
    pub const fn to_bytes(&self) -> FieldBytes {
        match self {
            Self::Left(n) | Self::Right(n) | Self::Parent(n) => {
                FieldBytes::Word(n.index().to_be_bytes())
            }
            Self::Color(c) => FieldBytes::Byte([c.to_byte()]),
            Self::OrderKey(v) | Self::Payload(v) => FieldBytes::Word(v.to_be_bytes()),
        }
    }
}

/// Encoded value of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldBytes {
    Byte([u8; 1]),
    Word([u8; 4]),
}

impl AsRef<[u8]> for FieldBytes {
    fn as_ref(&self) -> &[u8] {
        match self {
            Self::Byte(b) => b,
            Self::Word(w) => w,
        }
    }
}

/// File offset of the record in slot `index`.
#[must_use]
pub fn record_offset(index: u32) -> u64 {
    Header::SIZE as u64 + u64::from(index) * NodeRecord::SIZE as u64
}

/// Expected length of a file holding `node_count` records.
#[must_use]
pub fn file_len_for(node_count: u32) -> u64 {
    record_offset(node_count)
}

/// Copy four bytes starting at `offset`. Callers check the buffer length.
fn read_array(bytes: &[u8], offset: usize) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&bytes[offset..offset + 4]);
    out
}

/// Errors that can occur while decoding records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// Buffer is shorter than the encoded structure.
    ShortBuffer { expected: usize, actual: usize },
    /// Color byte is neither 0 nor 1.
    InvalidColor { index: i32, byte: u8 },
    /// Stored `self_index` does not match the slot the record was read from.
    IndexMismatch { slot: i32, stored: i32 },
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShortBuffer { expected, actual } => {
                write!(f, "short buffer: expected {expected} bytes, got {actual}")
            }
            Self::InvalidColor { index, byte } => {
                write!(f, "record {index} has invalid color byte {byte:#04x}")
            }
            Self::IndexMismatch { slot, stored } => {
                write!(f, "record in slot {slot} claims index {stored}")
            }
        }
    }
}

impl std::error::Error for RecordError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_header_bytes() {
        let bytes = Header::empty().to_bytes();
        assert_eq!(bytes, [0, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(Header::from_bytes(&bytes), Ok(Header::empty()));
    }

    #[test]
    fn test_record_layout_is_big_endian() {
        let record = NodeRecord {
            self_index: NodeRef::new(2),
            left: NodeRef::new(0),
            right: NodeRef::NIL,
            parent: NodeRef::new(1),
            color: Color::Red,
            order_key: 0x0102_0304,
            payload: -2,
        };

        let bytes = record.to_bytes();
        assert_eq!(&bytes[0..4], &[0, 0, 0, 2]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(&bytes[12..16], &[0, 0, 0, 1]);
        assert_eq!(bytes[16], 1);
        assert_eq!(&bytes[17..21], &[1, 2, 3, 4]);
        assert_eq!(&bytes[21..25], &[0xFF, 0xFF, 0xFF, 0xFE]);

        let decoded = NodeRecord::from_bytes(&bytes, NodeRef::new(2)).expect("decode");
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_invalid_color_rejected() {
        let mut bytes = NodeRecord::new(NodeRef::new(0), Color::Black, 1, 1).to_bytes();
        bytes[16] = 7;
        let result = NodeRecord::from_bytes(&bytes, NodeRef::new(0));
        assert_eq!(
            result,
            Err(RecordError::InvalidColor { index: 0, byte: 7 })
        );
    }

    #[test]
    fn test_index_mismatch_rejected() {
        let bytes = NodeRecord::new(NodeRef::new(3), Color::Black, 1, 1).to_bytes();
        let result = NodeRecord::from_bytes(&bytes, NodeRef::new(4));
        assert_eq!(
            result,
            Err(RecordError::IndexMismatch { slot: 4, stored: 3 })
        );
    }

    #[test]
    fn test_short_buffer_rejected() {
        assert!(matches!(
            Header::from_bytes(&[0, 0, 0]),
            Err(RecordError::ShortBuffer { expected: 8, actual: 3 })
        ));
        assert!(matches!(
            NodeRecord::from_bytes(&[0u8; 24], NodeRef::new(0)),
            Err(RecordError::ShortBuffer { expected: 25, actual: 24 })
        ));
    }

    #[test]
    fn test_field_offsets_match_record_layout() {
        let record = NodeRecord {
            self_index: NodeRef::new(0),
            left: NodeRef::new(11),
            right: NodeRef::new(12),
            parent: NodeRef::new(13),
            color: Color::Red,
            order_key: 14,
            payload: 15,
        };
        let bytes = record.to_bytes();

        for field in [
            Field::Left(NodeRef::new(11)),
            Field::Right(NodeRef::new(12)),
            Field::Parent(NodeRef::new(13)),
            Field::Color(Color::Red),
            Field::OrderKey(14),
            Field::Payload(15),
        ] {
            let encoded = field.to_bytes();
            let encoded = encoded.as_ref();
            let start = field.offset();
            assert_eq!(&bytes[start..start + encoded.len()], encoded, "{field:?}");
        }
    }

    #[test]
    fn test_record_offsets() {
        assert_eq!(record_offset(0), 8);
        assert_eq!(record_offset(3), 8 + 75);
        assert_eq!(file_len_for(0), 8);
    }
}
