//! Redb-backed key-value persistence.
//!
//! # Schema
//!
//! ```text
//! STORED_USERS:    username_lower -> StoredUser (serde_json)
//! STORED_CHANNELS: "net\0channel_lower" -> StoredChannel (serde_json)
//! STORE_META:      "initialized" -> [1]
//! ```

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::error::StoreError;

const STORED_USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("stored_users");
const STORED_CHANNELS: TableDefinition<&str, &[u8]> = TableDefinition::new("stored_channels");
const STORE_META: TableDefinition<&str, &[u8]> = TableDefinition::new("store_meta");

/// Marks that at least one user has ever been saved.
const INITIALIZED_KEY: &str = "initialized";

/// Thin wrapper over the embedded database.
pub(crate) struct Kv {
    db: Database,
}

impl Kv {
    /// Open (or create) an on-disk database.
    pub(crate) fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path)?;
        let kv = Kv { db };
        kv.ensure_tables()?;
        Ok(kv)
    }

    /// Create a database backed by memory only.
    pub(crate) fn in_memory() -> Result<Self, StoreError> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        let kv = Kv { db };
        kv.ensure_tables()?;
        Ok(kv)
    }

    /// Open every table once so later reads never see a missing table.
    fn ensure_tables(&self) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let _ = txn.open_table(STORED_USERS)?;
            let _ = txn.open_table(STORED_CHANNELS)?;
            let _ = txn.open_table(STORE_META)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn put(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        value: &[u8],
    ) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut t = txn.open_table(table)?;
            t.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn get(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let txn = self.db.begin_read()?;
        let t = txn.open_table(table)?;
        Ok(t.get(key)?.map(|guard| guard.value().to_vec()))
    }

    fn delete(&self, table: TableDefinition<&str, &[u8]>, key: &str) -> Result<bool, StoreError> {
        let txn = self.db.begin_write()?;
        let found = {
            let mut t = txn.open_table(table)?;
            t.remove(key)?.is_some()
        };
        txn.commit()?;
        Ok(found)
    }

    fn scan(
        &self,
        table: TableDefinition<&str, &[u8]>,
    ) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let txn = self.db.begin_read()?;
        let t = txn.open_table(table)?;
        let mut out = Vec::new();
        for item in t.iter()? {
            let (k, v) = item?;
            out.push((k.value().to_string(), v.value().to_vec()));
        }
        Ok(out)
    }

    pub(crate) fn put_user(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.put(STORED_USERS, key, value)
    }

    pub(crate) fn get_user(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.get(STORED_USERS, key)
    }

    pub(crate) fn delete_user(&self, key: &str) -> Result<bool, StoreError> {
        self.delete(STORED_USERS, key)
    }

    pub(crate) fn scan_users(&self) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        self.scan(STORED_USERS)
    }

    pub(crate) fn put_channel(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.put(STORED_CHANNELS, key, value)
    }

    pub(crate) fn get_channel(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.get(STORED_CHANNELS, key)
    }

    pub(crate) fn delete_channel(&self, key: &str) -> Result<bool, StoreError> {
        self.delete(STORED_CHANNELS, key)
    }

    pub(crate) fn scan_channels(&self) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        self.scan(STORED_CHANNELS)
    }

    pub(crate) fn set_initialized(&self) -> Result<(), StoreError> {
        self.put(STORE_META, INITIALIZED_KEY, &[1])
    }

    pub(crate) fn is_initialized(&self) -> Result<bool, StoreError> {
        Ok(self.get(STORE_META, INITIALIZED_KEY)?.is_some())
    }
}
