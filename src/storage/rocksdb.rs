//! Generic RocksDB utilities.
//!
//! This module contains no discussion-specific logic - just a configured
//! database handle with typed key-value operations, prefix iteration and
//! atomic batch commits. Values are encoded with bincode.

use crate::error::{RealtextError, Result};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options, WriteBatch,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Configuration for RocksDB storage.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum number of open files.
    pub max_open_files: i32,
    /// Number of log files to keep.
    pub keep_log_file_num: usize,
    /// Maximum WAL size in bytes.
    pub max_wal_size: u64,
    /// Write buffer size in bytes.
    pub write_buffer_size: usize,
    /// Maximum number of write buffers.
    pub max_write_buffer_number: i32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_open_files: 128,
            keep_log_file_num: 2,
            max_wal_size: 32 * 1024 * 1024,      // 32MB
            write_buffer_size: 32 * 1024 * 1024, // 32MB
            max_write_buffer_number: 2,
        }
    }
}

impl StoreConfig {
    /// Builds RocksDB Options from this configuration.
    fn build_options(&self) -> Options {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(self.max_open_files);
        opts.set_keep_log_file_num(self.keep_log_file_num);
        opts.set_max_total_wal_size(self.max_wal_size);
        opts.increase_parallelism(num_cpus::get() as i32);
        opts.set_write_buffer_size(self.write_buffer_size);
        opts.set_max_write_buffer_number(self.max_write_buffer_number);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }
}

/// Concatenates fixed-width key parts into one composite key.
///
/// All id encodings are 8 bytes big-endian, so plain concatenation keeps
/// lexicographic order equal to tuple order and needs no separator.
pub fn concat_keys(parts: &[&[u8]]) -> Vec<u8> {
    let mut key = Vec::with_capacity(parts.iter().map(|p| p.len()).sum());
    for part in parts {
        key.extend_from_slice(part);
    }
    key
}

/// A wrapper around RocksDB that provides common typed operations.
///
/// Designed to be embedded in a storage struct that owns the column
/// family layout and domain-specific key construction.
pub struct StoreHandle {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl StoreHandle {
    /// Opens a RocksDB database with the given column families.
    pub fn open(
        db_path: impl AsRef<Path>,
        config: &StoreConfig,
        column_families: &[&str],
    ) -> Result<Self> {
        let opts = config.build_options();
        let cf_opts = Options::default();

        let cf_descriptors: Vec<_> = column_families
            .iter()
            .map(|cf| ColumnFamilyDescriptor::new(*cf, cf_opts.clone()))
            .collect();

        let db = DBWithThreadMode::<MultiThreaded>::open_cf_descriptors(
            &opts,
            db_path.as_ref(),
            cf_descriptors,
        )
        .map_err(|e| RealtextError::storage(format!("Failed to open RocksDB: {}", e)))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Gets a column family handle.
    pub fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| RealtextError::storage(format!("Column family '{}' not found", name)))
    }

    /// Stores a serializable value at the given key.
    pub fn put<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let bytes = encode(value)?;

        trace!(
            cf = cf_name,
            key_len = key.len(),
            value_bytes = bytes.len(),
            "db_put: storing serialized value"
        );

        self.db
            .put_cf(&cf, key, &bytes)
            .map_err(|e| RealtextError::storage(format!("Failed to write: {}", e)))?;

        Ok(())
    }

    /// Loads and deserializes a value from the given key.
    pub fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;

        match self.db.get_cf(&cf, key) {
            Ok(Some(bytes)) => {
                trace!(
                    cf = cf_name,
                    key_len = key.len(),
                    value_bytes = bytes.len(),
                    "db_get: found record"
                );
                Ok(Some(decode(&bytes)?))
            }
            Ok(None) => {
                trace!(cf = cf_name, key_len = key.len(), "db_get: key not found");
                Ok(None)
            }
            Err(e) => Err(RealtextError::storage(format!("Failed to read: {}", e))),
        }
    }

    /// Checks if a key exists.
    pub fn exists(&self, cf_name: &str, key: &[u8]) -> Result<bool> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map(|v| v.is_some())
            .map_err(|e| RealtextError::storage(format!("Failed to check key: {}", e)))
    }

    /// Deletes a key.
    pub fn delete(&self, cf_name: &str, key: &[u8]) -> Result<()> {
        let cf = self.cf(cf_name)?;

        trace!(cf = cf_name, key_len = key.len(), "db_delete: deleting key");

        self.db
            .delete_cf(&cf, key)
            .map_err(|e| RealtextError::storage(format!("Failed to delete: {}", e)))?;
        Ok(())
    }

    /// Commits a write batch atomically.
    ///
    /// Multi-key mutations (cascade deletes, record-plus-index inserts)
    /// go through here so no partially-applied state is ever observable.
    pub fn write(&self, batch: WriteBatch) -> Result<()> {
        let ops = batch.len();
        self.db
            .write(batch)
            .map_err(|e| RealtextError::storage(format!("Failed to commit batch: {}", e)))?;

        debug!(batch_ops = ops, "db_write: committed batch");
        Ok(())
    }

    /// Iterates over all entries with the given prefix.
    ///
    /// The callback receives (key, value) pairs and should return true to
    /// continue or false to stop iteration.
    pub fn prefix_iterate<F>(&self, cf_name: &str, prefix: &[u8], mut callback: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let cf = self.cf(cf_name)?;
        let iter = self.db.prefix_iterator_cf(&cf, prefix);

        let mut count: usize = 0;
        for item in iter {
            match item {
                Ok((key, value)) => {
                    if !key.starts_with(prefix) {
                        break;
                    }
                    count += 1;
                    if !callback(&key, &value) {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Iterator error: {}", e);
                }
            }
        }

        trace!(
            cf = cf_name,
            prefix_len = prefix.len(),
            records_iterated = count,
            "db_prefix_iterate: completed iteration"
        );

        Ok(())
    }

    /// Collects all keys with the given prefix.
    pub fn prefix_keys(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut keys = Vec::new();
        self.prefix_iterate(cf_name, prefix, |key, _| {
            keys.push(key.to_vec());
            true
        })?;
        Ok(keys)
    }

    /// Counts all entries with the given prefix.
    pub fn prefix_count(&self, cf_name: &str, prefix: &[u8]) -> Result<usize> {
        let mut count = 0;
        self.prefix_iterate(cf_name, prefix, |_, _| {
            count += 1;
            true
        })?;
        Ok(count)
    }

    /// Iterates over all entries in a column family.
    pub fn iterate_all<F>(&self, cf_name: &str, mut callback: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let cf = self.cf(cf_name)?;
        let iter = self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start);

        for item in iter {
            match item {
                Ok((key, value)) => {
                    if !callback(&key, &value) {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Iterator error: {}", e);
                }
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle").field("db", &"RocksDB").finish()
    }
}

/// Serializes a value with bincode.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value)
        .map_err(|e| RealtextError::serialization(format!("Failed to serialize: {}", e)))
}

/// Deserializes a value with bincode.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes)
        .map_err(|e| RealtextError::serialization(format!("Failed to deserialize: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestData {
        name: String,
        value: u64,
    }

    fn create_test_db() -> (StoreHandle, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test_db");
        let config = StoreConfig::default();
        let db = StoreHandle::open(&db_path, &config, &["data", "meta"]).expect("Failed to open db");
        (db, temp_dir)
    }

    #[test]
    fn test_concat_keys() {
        let key = concat_keys(&[&1u64.to_be_bytes(), &2u64.to_be_bytes()]);
        assert_eq!(key.len(), 16);
        assert_eq!(&key[..8], &1u64.to_be_bytes());
    }

    #[test]
    fn test_put_and_get() {
        let (db, _temp) = create_test_db();

        let data = TestData {
            name: "Test".to_string(),
            value: 12345,
        };

        db.put("data", b"key1", &data).unwrap();

        let loaded: TestData = db.get("data", b"key1").unwrap().unwrap();
        assert_eq!(loaded, data);
    }

    #[test]
    fn test_exists_and_delete() {
        let (db, _temp) = create_test_db();

        db.put("meta", b"key", &7u64).unwrap();
        assert!(db.exists("meta", b"key").unwrap());

        db.delete("meta", b"key").unwrap();
        assert!(!db.exists("meta", b"key").unwrap());
    }

    #[test]
    fn test_prefix_iterate() {
        let (db, _temp) = create_test_db();

        db.put("data", b"prefix1:a", &1u64).unwrap();
        db.put("data", b"prefix1:b", &2u64).unwrap();
        db.put("data", b"prefix2:a", &3u64).unwrap();

        assert_eq!(db.prefix_count("data", b"prefix1:").unwrap(), 2);
        assert_eq!(db.prefix_keys("data", b"prefix2:").unwrap().len(), 1);
    }

    #[test]
    fn test_batch_commit() {
        let (db, _temp) = create_test_db();

        let mut batch = WriteBatch::default();
        let cf = db.cf("data").unwrap();
        batch.put_cf(&cf, b"a", encode(&1u64).unwrap());
        batch.put_cf(&cf, b"b", encode(&2u64).unwrap());
        drop(cf);
        db.write(batch).unwrap();

        assert!(db.exists("data", b"a").unwrap());
        assert!(db.exists("data", b"b").unwrap());
    }

    #[test]
    fn test_get_missing_key() {
        let (db, _temp) = create_test_db();
        let result: Option<TestData> = db.get("data", b"nonexistent").unwrap();
        assert!(result.is_none());
    }
}
