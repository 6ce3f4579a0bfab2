use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::notify::{Dispatcher, Subscription};
use crate::path::Path;
use crate::traits::{LedgerStore, TransactFn, WriteBatch, WriteOp};
use crate::value;

/// MemoryStore is a LedgerStore holding the whole tree in process memory.
///
/// It models the remote ledger for the engine and is the primary test
/// double: per-path writes, prefix subscriptions, and the serialized
/// read-modify-write all behave as the adapter contract describes, with no
/// cross-path atomicity promised to observers.
pub struct MemoryStore {
    root: RwLock<Value>,
    // Serializes transact() racers; apply/read never take it.
    txn_lock: Mutex<()>,
    dispatcher: Dispatcher,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(Value::Object(serde_json::Map::new())),
            txn_lock: Mutex::new(()),
            dispatcher: Dispatcher::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn read(&self, path: &Path) -> Result<Option<Value>, StoreError> {
        let root = self.root.read().map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(value::get_at(&root, path).cloned())
    }

    async fn apply(&self, batch: WriteBatch) -> Result<(), StoreError> {
        // Publishing under the write lock keeps notification order equal to
        // apply order for every path.
        let mut root = self.root.write().map_err(|e| StoreError::Storage(e.to_string()))?;
        for (path, op) in batch.iter() {
            match op {
                WriteOp::Set(v) => {
                    value::set_at(&mut root, path, v.clone());
                    let stored = value::get_at(&root, path).cloned();
                    self.dispatcher.publish(path, stored.as_ref());
                }
                WriteOp::Increment(delta) => {
                    let next = value::increment_at(&mut root, path, *delta);
                    self.dispatcher.publish(path, Some(&Value::from(next)));
                }
                WriteOp::Remove => {
                    if value::remove_at(&mut root, path) {
                        self.dispatcher.publish(path, None);
                    }
                }
            }
        }
        Ok(())
    }

    async fn transact(&self, path: &Path, apply: TransactFn<'_>) -> Result<Value, StoreError> {
        let _guard = self.txn_lock.lock().await;
        let mut root = self.root.write().map_err(|e| StoreError::Storage(e.to_string()))?;
        let current = value::get_at(&root, path).cloned();
        let next = apply(current);
        value::set_at(&mut root, path, next.clone());
        self.dispatcher.publish(path, Some(&next));
        Ok(next)
    }

    fn subscribe(&self, prefix: &Path) -> Subscription {
        self.dispatcher.subscribe(prefix.clone())
    }
}
