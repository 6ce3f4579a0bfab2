use std::path::Path as FsPath;

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::notify::{Dispatcher, Subscription};
use crate::path::Path;
use crate::traits::{LedgerStore, TransactFn, WriteBatch, WriteOp};
use crate::value;

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("ledger");

/// RedbStore is a LedgerStore backed by redb — a pure-Rust embedded
/// key-value database. The tree is stored flat: every scalar/array leaf
/// lives under its full slash path, and subtree reads assemble the nested
/// value from a prefix scan.
///
/// A whole WriteBatch commits in one redb transaction; callers still must
/// not rely on that, per the adapter contract.
pub struct RedbStore {
    db: Database,
    // Serializes writers and keeps publish order equal to commit order.
    write_lock: Mutex<()>,
    dispatcher: Dispatcher,
}

impl RedbStore {
    /// Open or create a redb ledger at the given filesystem path.
    pub fn open(path: &FsPath) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(|e| StoreError::Storage(e.to_string()))?;

        // Ensure the table exists by doing a write transaction.
        let write_txn = db
            .begin_write()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        {
            let _table = write_txn
                .open_table(TABLE)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
            dispatcher: Dispatcher::new(),
        })
    }

    /// Collect every stored key at or under `path`.
    fn keys_under(
        table: &impl ReadableTable<&'static str, &'static [u8]>,
        path: &Path,
    ) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        if !path.is_root() {
            if table
                .get(path.as_str())
                .map_err(|e| StoreError::Storage(e.to_string()))?
                .is_some()
            {
                keys.push(path.as_str().to_string());
            }
        }

        let prefix = if path.is_root() {
            String::new()
        } else {
            format!("{}/", path.as_str())
        };
        let iter = table
            .range(prefix.as_str()..)
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        for entry in iter {
            let entry = entry.map_err(|e| StoreError::Storage(e.to_string()))?;
            let key = entry.0.value().to_string();
            if !key.starts_with(&prefix) {
                break;
            }
            keys.push(key);
        }
        Ok(keys)
    }

    /// Break a nested value into (leaf path, leaf value) pairs.
    fn flatten(path: &Path, v: &Value, out: &mut Vec<(Path, Value)>) {
        match v {
            Value::Null => {}
            Value::Object(map) => {
                for (k, child) in map {
                    Self::flatten(&path.child(k), child, out);
                }
            }
            _ => out.push((path.clone(), v.clone())),
        }
    }

    fn decode(bytes: &[u8]) -> Result<Value, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn encode(v: &Value) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(v).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn set_node(
        table: &mut redb::Table<'_, &'static str, &'static [u8]>,
        path: &Path,
        v: &Value,
    ) -> Result<(), StoreError> {
        for key in Self::keys_under(&*table, path)? {
            table
                .remove(key.as_str())
                .map_err(|e| StoreError::Storage(e.to_string()))?;
        }
        let mut leaves = Vec::new();
        Self::flatten(path, v, &mut leaves);
        for (leaf_path, leaf) in leaves {
            let bytes = Self::encode(&leaf)?;
            table
                .insert(leaf_path.as_str(), bytes.as_slice())
                .map_err(|e| StoreError::Storage(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for RedbStore {
    async fn read(&self, path: &Path) -> Result<Option<Value>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        let table = read_txn
            .open_table(TABLE)
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        // Exact leaf first.
        if !path.is_root() {
            if let Some(bytes) = table
                .get(path.as_str())
                .map_err(|e| StoreError::Storage(e.to_string()))?
            {
                return Ok(Some(Self::decode(bytes.value())?));
            }
        }

        // Otherwise assemble the subtree from the prefix range.
        let prefix = if path.is_root() {
            String::new()
        } else {
            format!("{}/", path.as_str())
        };
        let mut assembled = Value::Object(serde_json::Map::new());
        let mut found = false;
        let iter = table
            .range(prefix.as_str()..)
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        for entry in iter {
            let entry = entry.map_err(|e| StoreError::Storage(e.to_string()))?;
            let key = entry.0.value().to_string();
            if !key.starts_with(&prefix) {
                break;
            }
            let leaf = Self::decode(entry.1.value())?;
            value::set_at(&mut assembled, &Path::new(&key[prefix.len()..]), leaf);
            found = true;
        }

        if found { Ok(Some(assembled)) } else { Ok(None) }
    }

    async fn apply(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut events: Vec<(Path, Option<Value>)> = Vec::new();
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(TABLE)
                .map_err(|e| StoreError::Storage(e.to_string()))?;

            for (path, op) in batch.iter() {
                match op {
                    WriteOp::Set(v) if v.is_null() => {
                        Self::set_node(&mut table, path, &Value::Null)?;
                        events.push((path.clone(), None));
                    }
                    WriteOp::Set(v) => {
                        Self::set_node(&mut table, path, v)?;
                        events.push((path.clone(), Some(v.clone())));
                    }
                    WriteOp::Increment(delta) => {
                        let current = table
                            .get(path.as_str())
                            .map_err(|e| StoreError::Storage(e.to_string()))?
                            .map(|v| Self::decode(v.value()))
                            .transpose()?
                            .as_ref()
                            .and_then(value::as_i64_lenient)
                            .unwrap_or(0);
                        let next = current + delta;
                        let bytes = Self::encode(&Value::from(next))?;
                        table
                            .insert(path.as_str(), bytes.as_slice())
                            .map_err(|e| StoreError::Storage(e.to_string()))?;
                        events.push((path.clone(), Some(Value::from(next))));
                    }
                    WriteOp::Remove => {
                        Self::set_node(&mut table, path, &Value::Null)?;
                        events.push((path.clone(), None));
                    }
                }
            }
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        for (path, v) in events {
            self.dispatcher.publish(&path, v.as_ref());
        }
        Ok(())
    }

    async fn transact(&self, path: &Path, apply: TransactFn<'_>) -> Result<Value, StoreError> {
        let _guard = self.write_lock.lock().await;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        let next = {
            let mut table = write_txn
                .open_table(TABLE)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let current = table
                .get(path.as_str())
                .map_err(|e| StoreError::Storage(e.to_string()))?
                .map(|v| Self::decode(v.value()))
                .transpose()?;
            let next = apply(current);
            let bytes = Self::encode(&next)?;
            table
                .insert(path.as_str(), bytes.as_slice())
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            next
        };
        write_txn
            .commit()
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        self.dispatcher.publish(path, Some(&next));
        Ok(next)
    }

    fn subscribe(&self, prefix: &Path) -> Subscription {
        self.dispatcher.subscribe(prefix.clone())
    }
}
