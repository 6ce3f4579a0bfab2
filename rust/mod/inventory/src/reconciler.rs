use std::sync::Arc;

use tracing::{debug, info};

use drysync_core::ServiceError;
use drysync_store::{LedgerStore, StoreError, WriteBatch};

use crate::model::{Batch, SizeLine, SlotAssignment};
use crate::schema::{self, field};

// ---------------------------------------------------------------------------
// Reconciler — counter deltas for assign / finish / clear
// ---------------------------------------------------------------------------

/// Applies the counter deltas for slot operations against batches and size
/// lines.
///
/// Every public operation reads the current state, folds all deltas into a
/// single [`WriteBatch`], and submits one multi-key write. Reversal and
/// re-application of the same counter cancel algebraically inside the
/// batch, which is what makes a reassignment a single race-safe step
/// instead of an unassign/assign pair that could double-count.
///
/// The store offers no cross-path atomicity; correctness holds because each
/// logical operation nets out to at most one effect per counter, and every
/// decrement is paired with a previously verified assignment. Errors are
/// reported to the caller once — retry policy belongs to the caller.
pub struct Reconciler {
    store: Arc<dyn LedgerStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    // ── Reads ──

    /// Current assignment of a slot. A missing node is an empty slot.
    pub async fn load_slot(&self, slot_id: u32) -> Result<SlotAssignment, ServiceError> {
        let v = self
            .store
            .read(&schema::rack_slot(slot_id))
            .await
            .map_err(store_err)?;
        Ok(v.map(|v| SlotAssignment::from_value(&v)).unwrap_or_default())
    }

    pub async fn load_batch(&self, batch_id: &str) -> Result<Batch, ServiceError> {
        let v = self
            .store
            .read(&schema::batch(batch_id))
            .await
            .map_err(store_err)?;
        v.and_then(|v| Batch::from_value(batch_id, &v))
            .ok_or_else(|| ServiceError::NotFound(format!("batch '{batch_id}' not found")))
    }

    pub async fn load_size_line(
        &self,
        batch_id: &str,
        size_key: &str,
    ) -> Result<SizeLine, ServiceError> {
        let v = self
            .store
            .read(&schema::size_line(batch_id, size_key))
            .await
            .map_err(store_err)?;
        v.and_then(|v| SizeLine::from_value(size_key, &v)).ok_or_else(|| {
            ServiceError::NotFound(format!("size line '{size_key}' not found on batch '{batch_id}'"))
        })
    }

    // ── Operations ──

    /// Single-step, race-safe replacement of a slot's assignment: reverse
    /// whatever the slot held, debit one piece from the new batch and size
    /// line, and rewrite the slot metadata — all in one submitted write.
    /// Correct even when old and new batch (or size) coincide.
    pub async fn assign_batch_and_size(
        &self,
        batch_id: &str,
        slot_id: u32,
        size_key: &str,
    ) -> Result<(), ServiceError> {
        validate_slot_id(slot_id)?;
        validate_key(batch_id, "batch id")?;
        validate_key(size_key, "size key")?;

        let old = self.load_slot(slot_id).await?;
        let batch = self.load_batch(batch_id).await?;
        let line = self.load_size_line(batch_id, size_key).await?;

        // Net effect on the target after reversal cancels out.
        let old_on_same_batch = old_piece_count_on(&old, batch_id);
        let old_on_same_line = old_piece_count_on_line(&old, batch_id, size_key);
        ensure_capacity(batch.remaining(), 1 - old_on_same_batch, &format!("batch '{batch_id}'"))?;
        ensure_capacity(
            line.remaining(),
            1 - old_on_same_line,
            &format!("size line '{size_key}'"),
        )?;

        let assignment = SlotAssignment {
            batch_id: Some(batch_id.to_string()),
            piece_count: 1,
            size_key: Some(size_key.to_string()),
            size_length: Some(line.length_dimension),
            size_width: Some(line.width_dimension),
        };

        let mut writes = reversal_deltas(WriteBatch::new(), &old);
        writes = writes
            .increment(schema::batch_field(batch_id, field::IN_RACK_COUNT), 1)
            .increment(schema::size_line_field(batch_id, size_key, field::IN_RACK), 1)
            .set(schema::rack_slot(slot_id), assignment.to_value());

        self.store.apply(writes).await.map_err(store_err)?;
        debug!(slot = slot_id, batch = batch_id, size = size_key, "slot assigned");
        Ok(())
    }

    /// Legacy assignment without size lines. Supports same-batch quantity
    /// changes (net `qty - old`) and cross-batch reassignment.
    pub async fn assign_batch_only(
        &self,
        batch_id: &str,
        slot_id: u32,
        qty: i64,
    ) -> Result<(), ServiceError> {
        validate_slot_id(slot_id)?;
        validate_key(batch_id, "batch id")?;
        if qty <= 0 {
            return Err(ServiceError::Validation(format!(
                "quantity must be positive, got {qty}"
            )));
        }

        let old = self.load_slot(slot_id).await?;
        let batch = self.load_batch(batch_id).await?;

        let old_on_same_batch = old_piece_count_on(&old, batch_id);
        ensure_capacity(batch.remaining(), qty - old_on_same_batch, &format!("batch '{batch_id}'"))?;

        let assignment = SlotAssignment {
            batch_id: Some(batch_id.to_string()),
            piece_count: qty,
            size_key: None,
            size_length: None,
            size_width: None,
        };

        let mut writes = reversal_deltas(WriteBatch::new(), &old);
        writes = writes
            .increment(schema::batch_field(batch_id, field::IN_RACK_COUNT), qty)
            .set(schema::rack_slot(slot_id), assignment.to_value());

        self.store.apply(writes).await.map_err(store_err)?;
        debug!(slot = slot_id, batch = batch_id, qty, "slot assigned (no size line)");
        Ok(())
    }

    /// Move the slot's material from in-rack to finished and clear the
    /// slot. The only operation that credits `finishedCount`.
    pub async fn finish_slot(&self, slot_id: u32) -> Result<(), ServiceError> {
        validate_slot_id(slot_id)?;
        let old = self.load_slot(slot_id).await?;
        let Some(batch_id) = old.batch_id.clone().filter(|_| old.piece_count > 0) else {
            return Err(ServiceError::SlotEmpty(format!("slot {slot_id} has no assignment")));
        };
        // Referenced records must still exist at read time.
        self.load_batch(&batch_id).await?;

        let mut writes = WriteBatch::new()
            .increment(schema::batch_field(&batch_id, field::IN_RACK_COUNT), -old.piece_count)
            .increment(schema::batch_field(&batch_id, field::FINISHED_COUNT), old.piece_count);
        if let Some(size_key) = &old.size_key {
            self.load_size_line(&batch_id, size_key).await?;
            writes = writes
                .increment(
                    schema::size_line_field(&batch_id, size_key, field::IN_RACK),
                    -old.piece_count,
                )
                .increment(
                    schema::size_line_field(&batch_id, size_key, field::FINISHED),
                    old.piece_count,
                );
        }
        writes = writes.set(schema::rack_slot(slot_id), SlotAssignment::cleared().to_value());

        self.store.apply(writes).await.map_err(store_err)?;
        info!(slot = slot_id, batch = %batch_id, pieces = old.piece_count, "slot finished");
        Ok(())
    }

    /// Return the slot's material to `remaining` (removed before drying
    /// completed) and clear the slot. No counter is credited anywhere.
    pub async fn clear_slot(&self, slot_id: u32) -> Result<(), ServiceError> {
        validate_slot_id(slot_id)?;
        let old = self.load_slot(slot_id).await?;
        let Some(batch_id) = old.batch_id.clone().filter(|_| old.piece_count > 0) else {
            return Err(ServiceError::SlotEmpty(format!("slot {slot_id} has no assignment")));
        };

        let mut writes = WriteBatch::new().increment(
            schema::batch_field(&batch_id, field::IN_RACK_COUNT),
            -old.piece_count,
        );
        if let Some(size_key) = &old.size_key {
            writes = writes.increment(
                schema::size_line_field(&batch_id, size_key, field::IN_RACK),
                -old.piece_count,
            );
        }
        writes = writes.set(schema::rack_slot(slot_id), SlotAssignment::cleared().to_value());

        self.store.apply(writes).await.map_err(store_err)?;
        info!(slot = slot_id, batch = %batch_id, pieces = old.piece_count, "slot cleared");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn store_err(e: StoreError) -> ServiceError {
    ServiceError::Storage(e.to_string())
}

fn validate_slot_id(slot_id: u32) -> Result<(), ServiceError> {
    if slot_id == 0 {
        return Err(ServiceError::Validation("slot id must be >= 1".into()));
    }
    Ok(())
}

fn validate_key(key: &str, what: &str) -> Result<(), ServiceError> {
    if key.trim().is_empty() || key.contains('/') {
        return Err(ServiceError::Validation(format!("invalid {what}: '{key}'")));
    }
    Ok(())
}

/// Schedule the debit reversal for whatever the slot currently holds.
/// Increments need no prior read, so a stale or vanished old batch still
/// nets out correctly when the paths coincide with the new assignment.
fn reversal_deltas(mut writes: WriteBatch, old: &SlotAssignment) -> WriteBatch {
    if let Some(old_batch) = &old.batch_id {
        if old.piece_count > 0 {
            writes = writes.increment(
                schema::batch_field(old_batch, field::IN_RACK_COUNT),
                -old.piece_count,
            );
            if let Some(old_size) = &old.size_key {
                writes = writes.increment(
                    schema::size_line_field(old_batch, old_size, field::IN_RACK),
                    -old.piece_count,
                );
            }
        }
    }
    writes
}

fn old_piece_count_on(old: &SlotAssignment, batch_id: &str) -> i64 {
    match &old.batch_id {
        Some(id) if id == batch_id && old.piece_count > 0 => old.piece_count,
        _ => 0,
    }
}

fn old_piece_count_on_line(old: &SlotAssignment, batch_id: &str, size_key: &str) -> i64 {
    match (&old.batch_id, &old.size_key) {
        (Some(id), Some(key)) if id == batch_id && key == size_key && old.piece_count > 0 => {
            old.piece_count
        }
        _ => 0,
    }
}

/// The counters must never exceed totals: reject a positive net debit the
/// target cannot absorb before anything reaches the store.
fn ensure_capacity(remaining: i64, net_delta: i64, what: &str) -> Result<(), ServiceError> {
    if net_delta > 0 && remaining < net_delta {
        return Err(ServiceError::Validation(format!(
            "{what} has {remaining} remaining, cannot debit {net_delta}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
