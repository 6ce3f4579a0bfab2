use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use drysync_core::ServiceError;
use drysync_store::value::{as_f64_lenient, get_at};
use drysync_store::{LedgerStore, Path, WriteBatch};

use crate::idgen::SequenceGenerator;
use crate::model::{Batch, SizeLine, SlotAssignment, SlotStatus};
use crate::query;
use crate::reconciler::Reconciler;
use crate::schema;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// One size line of a new batch, as entered by the operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewSizeLine {
    pub quantity: i64,
    pub length_dimension: f64,
    pub width_dimension: f64,
}

/// Display-only ambient readings from the drying shed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnvironmentReading {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

/// A live batch-list subscription: snapshots arrive newest-arrival-first
/// after every ledger change under `batches`. Dropping the handle stops the
/// feed.
pub struct BatchWatch {
    rx: mpsc::UnboundedReceiver<Vec<Batch>>,
    cancel: CancellationToken,
}

impl BatchWatch {
    /// Next snapshot, or None once the watch has stopped.
    pub async fn recv(&mut self) -> Option<Vec<Batch>> {
        self.rx.recv().await
    }
}

impl Drop for BatchWatch {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// InventoryService — the command facade consumed by the UI layer
// ---------------------------------------------------------------------------

/// All operator-facing commands: batch creation, slot operations, listing
/// and dashboard reads. Holds the store seam, the reconciler, and the
/// sequence generator.
pub struct InventoryService {
    store: Arc<dyn LedgerStore>,
    reconciler: Arc<Reconciler>,
    idgen: SequenceGenerator,
}

impl InventoryService {
    pub fn new(store: Arc<dyn LedgerStore>, utc_offset_hours: i32) -> Self {
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&store)));
        let idgen = SequenceGenerator::new(Arc::clone(&store), utc_offset_hours);
        Self { store, reconciler, idgen }
    }

    pub fn reconciler(&self) -> Arc<Reconciler> {
        Arc::clone(&self.reconciler)
    }

    pub fn store(&self) -> Arc<dyn LedgerStore> {
        Arc::clone(&self.store)
    }

    // ── Batch creation ──

    /// Create a batch from size lines. The lines are the source of truth:
    /// the batch total is their quantity sum, and at least one valid line
    /// is required.
    pub async fn create_batch(
        &self,
        lines: &[NewSizeLine],
        arrival_ms: i64,
    ) -> Result<String, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::Validation(
                "at least one size line is required".into(),
            ));
        }
        for (i, line) in lines.iter().enumerate() {
            if line.quantity <= 0 {
                return Err(ServiceError::Validation(format!(
                    "size line {i}: quantity must be positive"
                )));
            }
            if line.length_dimension <= 0.0 || line.width_dimension <= 0.0 {
                return Err(ServiceError::Validation(format!(
                    "size line {i}: dimensions must be positive"
                )));
            }
        }
        let total: i64 = lines.iter().map(|l| l.quantity).sum();

        // Daily housekeeping, then allocate the id. Both are store-backed;
        // only the batch write below is load-bearing.
        self.idgen.cleanup_old_counters(&self.idgen.today_key()).await;
        let batch_id = self.idgen.next_batch_id().await;

        let mut node = Batch::new(&batch_id, total, arrival_ms).to_value();
        let mut sizes = serde_json::Map::new();
        for (i, line) in lines.iter().enumerate() {
            let size = SizeLine::new(i.to_string(), line.quantity, line.length_dimension, line.width_dimension);
            sizes.insert(i.to_string(), size.to_value());
        }
        node["sizes"] = Value::Object(sizes);

        self.store
            .apply(WriteBatch::new().set(schema::batch(&batch_id), node))
            .await
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        debug!(batch = %batch_id, total, lines = lines.len(), "batch created");
        Ok(batch_id)
    }

    /// Legacy creation path: a bare total, no size lines.
    pub async fn create_batch_legacy(
        &self,
        total_quantity: i64,
        arrival_ms: i64,
    ) -> Result<String, ServiceError> {
        if total_quantity <= 0 {
            return Err(ServiceError::Validation(format!(
                "total quantity must be positive, got {total_quantity}"
            )));
        }

        self.idgen.cleanup_old_counters(&self.idgen.today_key()).await;
        let batch_id = self.idgen.next_batch_id().await;

        let node = Batch::new(&batch_id, total_quantity, arrival_ms).to_value();
        self.store
            .apply(WriteBatch::new().set(schema::batch(&batch_id), node))
            .await
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        debug!(batch = %batch_id, total_quantity, "batch created (legacy)");
        Ok(batch_id)
    }

    // ── Listing ──

    /// All batches, newest arrival first. Unparsable children are skipped.
    pub async fn list_batches(&self) -> Result<Vec<Batch>, ServiceError> {
        read_all_batches(&self.store).await
    }

    /// Realtime variant of `list_batches`: a snapshot now, then one after
    /// every change under `batches`.
    pub fn watch_batches(&self) -> BatchWatch {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let store = Arc::clone(&self.store);
        let token = cancel.clone();
        let mut feed = store.subscribe(&schema::batches_root());

        tokio::spawn(async move {
            match read_all_batches(&store).await {
                Ok(snapshot) => {
                    if tx.send(snapshot).is_err() {
                        return;
                    }
                }
                Err(e) => warn!("batch watch initial read failed: {e}"),
            }
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    ev = feed.recv() => {
                        if ev.is_none() {
                            break;
                        }
                        match read_all_batches(&store).await {
                            Ok(snapshot) => {
                                if tx.send(snapshot).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("batch watch refresh failed: {e}"),
                        }
                    }
                }
            }
        });

        BatchWatch { rx, cancel }
    }

    /// Size lines of one batch, in key order. Errors if the batch itself is
    /// missing; a sized-less batch yields an empty list.
    pub async fn load_size_lines(&self, batch_id: &str) -> Result<Vec<SizeLine>, ServiceError> {
        self.reconciler.load_batch(batch_id).await?;

        let snapshot = self
            .store
            .read(&schema::sizes(batch_id))
            .await
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        let mut lines = Vec::new();
        if let Some(Value::Object(children)) = snapshot {
            for (key, node) in &children {
                if let Some(line) = SizeLine::from_value(key, node) {
                    lines.push(line);
                }
            }
        }
        // Keys are decimal indexes; order numerically where possible.
        lines.sort_by_key(|l| (l.key.parse::<u64>().unwrap_or(u64::MAX), l.key.clone()));
        Ok(lines)
    }

    // ── Slot commands ──

    pub async fn assign_batch_and_size(
        &self,
        batch_id: &str,
        slot_id: u32,
        size_key: &str,
    ) -> Result<(), ServiceError> {
        self.reconciler.assign_batch_and_size(batch_id, slot_id, size_key).await
    }

    pub async fn assign_batch_only(
        &self,
        batch_id: &str,
        slot_id: u32,
        qty: i64,
    ) -> Result<(), ServiceError> {
        self.reconciler.assign_batch_only(batch_id, slot_id, qty).await
    }

    pub async fn finish_slot(&self, slot_id: u32) -> Result<(), ServiceError> {
        self.reconciler.finish_slot(slot_id).await
    }

    pub async fn clear_slot(&self, slot_id: u32) -> Result<(), ServiceError> {
        self.reconciler.clear_slot(slot_id).await
    }

    /// Manual override for an Active slot — same path as the automatic
    /// finish on the Complete→Inactive transition.
    pub async fn mark_slot_complete(&self, slot_id: u32) -> Result<(), ServiceError> {
        self.reconciler.finish_slot(slot_id).await
    }

    pub async fn slot_assignment(&self, slot_id: u32) -> Result<SlotAssignment, ServiceError> {
        self.reconciler.load_slot(slot_id).await
    }

    // ── Dashboard reads ──

    /// Latest numeric sensor reading for a slot, if any. Display-only.
    pub async fn sensor_value(&self, slot_id: u32) -> Result<Option<f64>, ServiceError> {
        let v = self
            .store
            .read(&schema::sensor_value(slot_id))
            .await
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(v.as_ref().and_then(as_f64_lenient))
    }

    /// Current status of every slot with a sensor node, ordered by slot id.
    pub async fn sensor_statuses(&self) -> Result<Vec<(u32, SlotStatus)>, ServiceError> {
        let snapshot = self
            .store
            .read(&schema::sensors_root())
            .await
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        let mut statuses = Vec::new();
        if let Some(Value::Object(children)) = snapshot {
            for (key, node) in &children {
                let Ok(slot_id) = key.parse::<u32>() else {
                    continue;
                };
                if let Some(status) = SlotStatus::from_value(get_at(node, &Path::new("status"))) {
                    statuses.push((slot_id, status));
                }
            }
        }
        statuses.sort_by_key(|(id, _)| *id);
        Ok(statuses)
    }

    /// Shed temperature and humidity. Display-only.
    pub async fn environment(&self) -> Result<EnvironmentReading, ServiceError> {
        let temperature = self
            .store
            .read(&schema::environment_temperature())
            .await
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let humidity = self
            .store
            .read(&schema::environment_humidity())
            .await
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(EnvironmentReading {
            temperature: temperature.as_ref().and_then(as_f64_lenient),
            humidity: humidity.as_ref().and_then(as_f64_lenient),
        })
    }
}

/// Read and parse every batch under `batches`, newest arrival first.
async fn read_all_batches(store: &Arc<dyn LedgerStore>) -> Result<Vec<Batch>, ServiceError> {
    let snapshot = store
        .read(&schema::batches_root())
        .await
        .map_err(|e| ServiceError::Storage(e.to_string()))?;

    let mut batches = Vec::new();
    if let Some(Value::Object(children)) = snapshot {
        for (id, node) in &children {
            match Batch::from_value(id, node) {
                Some(b) => batches.push(b),
                None => warn!(batch = %id, "skipping unparsable batch node"),
            }
        }
    }
    query::sort_by_arrival_desc(&mut batches);
    Ok(batches)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
