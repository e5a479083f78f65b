// Layers, bottom up:
//  - record: byte layout of the header and node records
//  - file: a `NodeStore` over any seekable stream
//  - tree: red-black insert, delete, and search through the store
//  - database: locked file sessions driven by `StoreConfig`
//  - cli: argument parsing and command dispatch
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cli;
pub mod config;
mod e2e_tests;
pub mod storage;
