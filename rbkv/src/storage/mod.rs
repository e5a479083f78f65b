//! Single-file red-black tree storage engine.
//!
//! # File Format
//!
//! The store is one file:
//!
//! - Bytes 0-7: header (`node_count`, `root_index`)
//! - Bytes 8..: dense array of 25-byte node records
//!
//! Links between nodes are record indices; index -1 is the sentinel.
//!
//! # Usage
//!
//! ```
//! use std::io::Cursor;
//! use rbkv::storage::{NodeFile, RbTree};
//!
//! let mut file = NodeFile::format(Cursor::new(Vec::new())).unwrap();
//! let mut tree = RbTree::new(&mut file);
//!
//! tree.insert(10, 100).unwrap();
//! tree.insert(20, 200).unwrap();
//! tree.insert(30, 300).unwrap();
//!
//! assert_eq!(tree.find(20).unwrap().map(|f| f.payload), Some(200));
//! assert_eq!(tree.keys().unwrap(), vec![10, 20, 30]);
//! ```

mod database;
mod file;
mod io;
mod node;
mod record;
mod tree;

pub use database::{Database, DatabaseError, InitError};
pub use file::{FileError, NodeFile};
pub use io::{NodeStore, StoreError};
pub use node::{Color, NodeRef};
pub use record::{Field, FieldBytes, Header, NodeRecord, RecordError, file_len_for, record_offset};
pub use tree::{DuplicatePolicy, Found, InsertOutcome, RbTree, TreeError, TreeStats};
