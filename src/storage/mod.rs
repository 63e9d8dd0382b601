//! Storage infrastructure.
//!
//! Generic RocksDB plumbing lives here; the discussion-specific column
//! family layout is in [`crate::store`].

pub mod rocksdb;

pub use rocksdb::{concat_keys, StoreConfig, StoreHandle};
