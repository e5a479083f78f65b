//! End-to-end tests at the storage file level.
//!
//! Each test file drives real files through `Database` sessions and checks
//! the bytes left on disk.

#![cfg(test)]

mod helpers;

mod test_delete_then_find;
mod test_empty_store;
mod test_file_layout;
mod test_many_inserts;
mod test_reopen_persistence;
