use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::notify::Subscription;
use crate::path::Path;

// ── WriteBatch ──────────────────────────────────────────────────────

/// A single write operation against one ledger path.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Replace the node. `Value::Null` behaves like `Remove`.
    Set(Value),
    /// Add a signed delta to the integer leaf (missing counts as zero).
    Increment(i64),
    /// Delete the node and everything under it.
    Remove,
}

/// An ordered set of per-path writes submitted together.
///
/// Increments against the same path fold additively as they are scheduled,
/// so a reversal and a re-application of the same counter cancel
/// algebraically before anything reaches the store — a folded sum of zero
/// drops the op entirely. `Set`/`Remove` ops keep their position and stop
/// earlier increments on that path from folding across them.
#[derive(Debug, Default)]
pub struct WriteBatch {
    ops: Vec<(Path, WriteOp)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: Path, value: Value) -> Self {
        self.ops.push((path, WriteOp::Set(value)));
        self
    }

    pub fn remove(mut self, path: Path) -> Self {
        self.ops.push((path, WriteOp::Remove));
        self
    }

    pub fn increment(mut self, path: Path, delta: i64) -> Self {
        // Fold into the most recent increment on the same path, unless a
        // Set/Remove for that path intervened.
        for i in (0..self.ops.len()).rev() {
            if self.ops[i].0 != path {
                continue;
            }
            match &mut self.ops[i].1 {
                WriteOp::Increment(existing) => {
                    *existing += delta;
                    if *existing == 0 {
                        self.ops.remove(i);
                    }
                    return self;
                }
                WriteOp::Set(_) | WriteOp::Remove => break,
            }
        }
        if delta != 0 {
            self.ops.push((path, WriteOp::Increment(delta)));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Path, WriteOp)> {
        self.ops.iter()
    }
}

// ── LedgerStore ─────────────────────────────────────────────────────

/// Read-modify-write function for [`LedgerStore::transact`].
pub type TransactFn<'a> = &'a (dyn Fn(Option<Value>) -> Value + Send + Sync);

/// The ledger store seam: a hierarchical key-value tree with per-path
/// atomic increments, multi-key writes, a serialized read-modify-write
/// primitive, and change subscriptions.
///
/// Every operation is asynchronous; no call blocks a shared thread.
/// `apply` is best-effort multi-path: each key is independently durable
/// and the set is submitted together. The embedded redb backend happens to
/// apply a batch in one transaction — callers must not rely on cross-path
/// atomicity, and subscribers may observe the paths of one batch at
/// different times. Updates to a single path are delivered to each
/// subscriber in write order.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Read the node at `path`. Returns None if nothing is stored there.
    async fn read(&self, path: &Path) -> Result<Option<Value>, StoreError>;

    /// Submit a multi-key write.
    async fn apply(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Serialized read-modify-write on a single path. At most one writer
    /// wins a race; the store retries internally until the commit lands or
    /// a true error surfaces. Returns the committed value.
    async fn transact(&self, path: &Path, apply: TransactFn<'_>) -> Result<Value, StoreError>;

    /// Subscribe to changes at or under `prefix`. The handle unsubscribes
    /// on drop.
    fn subscribe(&self, prefix: &Path) -> Subscription;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn increments_fold_additively() {
        let batch = WriteBatch::new()
            .increment(Path::new("b/x/inRackCount"), -1)
            .increment(Path::new("b/y/inRackCount"), 1)
            .increment(Path::new("b/x/inRackCount"), 2);
        assert_eq!(batch.len(), 2);
        let ops: Vec<_> = batch.iter().collect();
        assert_eq!(ops[0].1, WriteOp::Increment(1));
        assert_eq!(ops[1].1, WriteOp::Increment(1));
    }

    #[test]
    fn cancelled_increment_is_dropped() {
        let p = Path::new("b/x/inRackCount");
        let batch = WriteBatch::new()
            .increment(p.clone(), -1)
            .increment(p.clone(), 1);
        assert!(batch.is_empty());

        let batch = WriteBatch::new().increment(p, 0);
        assert!(batch.is_empty());
    }

    #[test]
    fn set_blocks_fold_across_it() {
        let p = Path::new("slot/3");
        let batch = WriteBatch::new()
            .increment(p.clone(), 1)
            .set(p.clone(), json!({"pieceCount": 0}))
            .increment(p.clone(), -1);
        // -1 must not fold into the +1 scheduled before the Set.
        assert_eq!(batch.len(), 3);
    }
}
