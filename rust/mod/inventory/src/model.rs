use serde_json::Value;
use tracing::warn;

use drysync_store::value::{as_f64_lenient, first_i64};

use crate::schema::field;

// ---------------------------------------------------------------------------
// SlotStatus
// ---------------------------------------------------------------------------

/// Drying status of a rack slot, as reported by the sensor feed.
///
/// ```text
/// Inactive → Active → Complete → Inactive → …
/// ```
///
/// The status is never stored by this engine — it is observed from
/// `sensors/{slot}/status` and drives the slot state machine. Parsing is
/// case-insensitive; any unrecognized reading counts as Active (the slot is
/// occupied and still drying).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Inactive,
    Active,
    Complete,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "Inactive",
            Self::Active => "Active",
            Self::Complete => "Complete",
        }
    }

    /// Parse a raw sensor reading. Free-form strings are tolerated and
    /// treated as active-like.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "inactive" => Self::Inactive,
            "complete" => Self::Complete,
            _ => Self::Active,
        }
    }

    /// Parse a sensor node value. `None`/null means no reading yet.
    pub fn from_value(v: Option<&Value>) -> Option<Self> {
        match v {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(Self::parse(s)),
            Some(other) => Some(Self::parse(&other.to_string())),
        }
    }
}

impl std::fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// A tracked lot of lumber with a declared total piece count.
///
/// Conservation invariant: `in_rack_count + finished_count ≤ total_quantity`
/// and all counters ≥ 0. The setters re-clamp an externally supplied pair —
/// that path only fires on corrupt upstream writes, so the clamp logs.
/// Authoritative mutation goes through the reconciler; this type is for
/// validation and display reads.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub id: String,
    pub arrival_ms: i64,
    total_quantity: i64,
    in_rack_count: i64,
    finished_count: i64,
}

impl Batch {
    pub fn new(id: impl Into<String>, total_quantity: i64, arrival_ms: i64) -> Self {
        Self {
            id: id.into(),
            arrival_ms,
            total_quantity: total_quantity.max(0),
            in_rack_count: 0,
            finished_count: 0,
        }
    }

    pub fn total_quantity(&self) -> i64 {
        self.total_quantity
    }

    pub fn in_rack_count(&self) -> i64 {
        self.in_rack_count
    }

    pub fn finished_count(&self) -> i64 {
        self.finished_count
    }

    /// Pieces neither in a rack nor finished. Never negative.
    pub fn remaining(&self) -> i64 {
        (self.total_quantity - self.in_rack_count - self.finished_count).max(0)
    }

    /// Low-stock badge threshold: 10% of the total, at least 5 pieces.
    pub fn low_stock_threshold(&self) -> i64 {
        ((self.total_quantity + 9) / 10).max(5)
    }

    pub fn set_in_rack_count(&mut self, n: i64) {
        self.in_rack_count = n.max(0);
        self.clamp_counts();
    }

    pub fn set_finished_count(&mut self, n: i64) {
        self.finished_count = n.max(0);
        self.clamp_counts();
    }

    /// Restore the conservation invariant when an externally supplied pair
    /// overflows the total: shrink finished first, then in-rack. Fires only
    /// on corrupt writes, so it warns.
    fn clamp_counts(&mut self) {
        let sum = self.in_rack_count + self.finished_count;
        if sum > self.total_quantity {
            warn!(
                batch = %self.id,
                total = self.total_quantity,
                in_rack = self.in_rack_count,
                finished = self.finished_count,
                "counters exceed total, clamping"
            );
            let mut overflow = sum - self.total_quantity;
            let reduce_finished = overflow.min(self.finished_count);
            self.finished_count -= reduce_finished;
            overflow -= reduce_finished;
            self.in_rack_count = (self.in_rack_count - overflow).max(0);
        }
    }

    /// Parse a ledger node. Tolerates numeric fields arriving as strings or
    /// floats and accepts the legacy `inRack`/`finished` alias keys.
    /// Returns None for non-object nodes.
    pub fn from_value(id: &str, v: &Value) -> Option<Self> {
        if !v.is_object() {
            return None;
        }
        let total = first_i64(v, &[field::TOTAL_QUANTITY]).unwrap_or(0);
        let arrival = first_i64(v, &[field::ARRIVAL_TIME, field::ARRIVAL_TIME_LEGACY]).unwrap_or(0);
        let mut batch = Batch::new(id, total, arrival);
        batch.set_in_rack_count(
            first_i64(v, &[field::IN_RACK_COUNT, field::IN_RACK]).unwrap_or(0),
        );
        batch.set_finished_count(
            first_i64(v, &[field::FINISHED_COUNT, field::FINISHED]).unwrap_or(0),
        );
        Some(batch)
    }

    /// Ledger representation, canonical field names only.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "totalQuantity": self.total_quantity,
            "inRackCount": self.in_rack_count,
            "finishedCount": self.finished_count,
            "arrivalTime": self.arrival_ms,
        })
    }
}

// ---------------------------------------------------------------------------
// SizeLine
// ---------------------------------------------------------------------------

/// A sub-division of a batch by physical dimension, with its own counters
/// under the same conservation invariant.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeLine {
    pub key: String,
    pub quantity: i64,
    pub length_dimension: f64,
    pub width_dimension: f64,
    in_rack: i64,
    finished: i64,
}

impl SizeLine {
    pub fn new(key: impl Into<String>, quantity: i64, length_dimension: f64, width_dimension: f64) -> Self {
        Self {
            key: key.into(),
            quantity: quantity.max(0),
            length_dimension,
            width_dimension,
            in_rack: 0,
            finished: 0,
        }
    }

    pub fn in_rack(&self) -> i64 {
        self.in_rack
    }

    pub fn finished(&self) -> i64 {
        self.finished
    }

    pub fn remaining(&self) -> i64 {
        (self.quantity - self.in_rack - self.finished).max(0)
    }

    pub fn set_in_rack(&mut self, n: i64) {
        self.in_rack = n.max(0);
        self.clamp_counts();
    }

    pub fn set_finished(&mut self, n: i64) {
        self.finished = n.max(0);
        self.clamp_counts();
    }

    fn clamp_counts(&mut self) {
        let sum = self.in_rack + self.finished;
        if sum > self.quantity {
            warn!(
                size_key = %self.key,
                quantity = self.quantity,
                in_rack = self.in_rack,
                finished = self.finished,
                "size line counters exceed quantity, clamping"
            );
            let mut overflow = sum - self.quantity;
            let reduce_finished = overflow.min(self.finished);
            self.finished -= reduce_finished;
            overflow -= reduce_finished;
            self.in_rack = (self.in_rack - overflow).max(0);
        }
    }

    /// Parse a ledger node, accepting the legacy `lengthFt`/`widthIn`
    /// dimension keys. Returns None for non-object nodes.
    pub fn from_value(key: &str, v: &Value) -> Option<Self> {
        if !v.is_object() {
            return None;
        }
        let quantity = first_i64(v, &[field::QUANTITY]).unwrap_or(0);
        let length = lenient_f64_first(v, &[field::LENGTH_DIMENSION, field::LENGTH_LEGACY]);
        let width = lenient_f64_first(v, &[field::WIDTH_DIMENSION, field::WIDTH_LEGACY]);
        let mut line = SizeLine::new(key, quantity, length, width);
        line.set_in_rack(first_i64(v, &[field::IN_RACK]).unwrap_or(0));
        line.set_finished(first_i64(v, &[field::FINISHED]).unwrap_or(0));
        Some(line)
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "quantity": self.quantity,
            "lengthDimension": self.length_dimension,
            "widthDimension": self.width_dimension,
            "inRack": self.in_rack,
            "finished": self.finished,
        })
    }
}

fn lenient_f64_first(obj: &Value, keys: &[&str]) -> f64 {
    keys.iter()
        .filter_map(|k| obj.get(*k).and_then(as_f64_lenient))
        .next()
        .unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// SlotAssignment
// ---------------------------------------------------------------------------

/// Assignment metadata stored at `rackSlots/{slotId}`.
///
/// A populated assignment means the batch debit was already applied; the
/// reconciler is the only writer. The size dimensions are denormalized
/// copies for display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotAssignment {
    pub batch_id: Option<String>,
    pub piece_count: i64,
    pub size_key: Option<String>,
    pub size_length: Option<f64>,
    pub size_width: Option<f64>,
}

impl SlotAssignment {
    /// Whether the slot holds no material.
    pub fn is_empty(&self) -> bool {
        self.batch_id.is_none() || self.piece_count <= 0
    }

    /// Assigned but missing the size selection (legacy assignments).
    pub fn missing_size(&self) -> bool {
        !self.is_empty() && self.size_key.is_none()
    }

    pub fn from_value(v: &Value) -> Self {
        let batch_id = v
            .get(field::BATCH_ID)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let size_key = v
            .get(field::SIZE_KEY)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Self {
            batch_id,
            piece_count: first_i64(v, &[field::PIECE_COUNT]).unwrap_or(0),
            size_key,
            size_length: v.get(field::SIZE_LENGTH).and_then(as_f64_lenient),
            size_width: v.get(field::SIZE_WIDTH).and_then(as_f64_lenient),
        }
    }

    /// Ledger representation. Absent fields are omitted — the ledger never
    /// stores explicit nulls, so a cleared slot serializes as
    /// `{"pieceCount": 0}`.
    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        if let Some(id) = &self.batch_id {
            map.insert(field::BATCH_ID.into(), Value::from(id.clone()));
        }
        map.insert(field::PIECE_COUNT.into(), Value::from(self.piece_count));
        if let Some(key) = &self.size_key {
            map.insert(field::SIZE_KEY.into(), Value::from(key.clone()));
        }
        if let Some(len) = self.size_length {
            map.insert(field::SIZE_LENGTH.into(), Value::from(len));
        }
        if let Some(wid) = self.size_width {
            map.insert(field::SIZE_WIDTH.into(), Value::from(wid));
        }
        Value::Object(map)
    }

    /// The cleared state written by finish/clear.
    pub fn cleared() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_parse_tolerates_free_form() {
        assert_eq!(SlotStatus::parse("Inactive"), SlotStatus::Inactive);
        assert_eq!(SlotStatus::parse("  COMPLETE "), SlotStatus::Complete);
        assert_eq!(SlotStatus::parse("Active"), SlotStatus::Active);
        // Unrecognized readings count as still drying.
        assert_eq!(SlotStatus::parse("drying-72%"), SlotStatus::Active);
        assert_eq!(SlotStatus::parse(""), SlotStatus::Active);
    }

    #[test]
    fn status_from_value() {
        assert_eq!(SlotStatus::from_value(None), None);
        assert_eq!(SlotStatus::from_value(Some(&Value::Null)), None);
        assert_eq!(
            SlotStatus::from_value(Some(&json!("complete"))),
            Some(SlotStatus::Complete)
        );
        assert_eq!(SlotStatus::from_value(Some(&json!(3))), Some(SlotStatus::Active));
    }

    #[test]
    fn batch_remaining_and_clamp() {
        let mut b = Batch::new("B-20250101-0001", 10, 1);
        assert_eq!(b.remaining(), 10);

        b.set_in_rack_count(4);
        b.set_finished_count(3);
        assert_eq!(b.remaining(), 3);

        // Corrupt pair: 8 + 7 > 10 — finished shrinks first.
        b.set_in_rack_count(8);
        b.set_finished_count(7);
        assert_eq!(b.finished_count(), 2);
        assert_eq!(b.in_rack_count(), 8);
        assert_eq!(b.remaining(), 0);
    }

    #[test]
    fn batch_clamp_spills_into_in_rack() {
        let mut b = Batch::new("B-1", 5, 0);
        b.set_in_rack_count(9);
        assert_eq!(b.in_rack_count(), 5);
        assert_eq!(b.finished_count(), 0);
    }

    #[test]
    fn batch_negative_total_clamps_to_zero() {
        let b = Batch::new("B-1", -3, 0);
        assert_eq!(b.total_quantity(), 0);
        assert_eq!(b.remaining(), 0);
    }

    #[test]
    fn batch_from_value_accepts_legacy_aliases_and_strings() {
        let v = json!({
            "totalQuantity": "25",
            "inRack": 4,
            "finished": 1.0,
            "arrivalDateMillis": 1735689600000i64,
        });
        let b = Batch::from_value("B-20250101-0002", &v).unwrap();
        assert_eq!(b.total_quantity(), 25);
        assert_eq!(b.in_rack_count(), 4);
        assert_eq!(b.finished_count(), 1);
        assert_eq!(b.arrival_ms, 1735689600000);

        // Canonical keys win over aliases.
        let v = json!({"totalQuantity": 10, "inRackCount": 2, "inRack": 9});
        let b = Batch::from_value("B-1", &v).unwrap();
        assert_eq!(b.in_rack_count(), 2);

        assert!(Batch::from_value("B-1", &json!("junk")).is_none());
    }

    #[test]
    fn low_stock_threshold_floors_at_five() {
        assert_eq!(Batch::new("B-1", 10, 0).low_stock_threshold(), 5);
        assert_eq!(Batch::new("B-1", 80, 0).low_stock_threshold(), 8);
        assert_eq!(Batch::new("B-1", 101, 0).low_stock_threshold(), 11);
    }

    #[test]
    fn size_line_roundtrip_and_legacy_dimensions() {
        let line = SizeLine::new("0", 5, 4.0, 3.0);
        let back = SizeLine::from_value("0", &line.to_value()).unwrap();
        assert_eq!(back, line);

        let v = json!({"quantity": 5, "lengthFt": 4, "widthIn": "3.5", "inRack": 1, "finished": 0});
        let line = SizeLine::from_value("1", &v).unwrap();
        assert_eq!(line.length_dimension, 4.0);
        assert_eq!(line.width_dimension, 3.5);
        assert_eq!(line.remaining(), 4);
    }

    #[test]
    fn slot_assignment_states() {
        let empty = SlotAssignment::from_value(&json!({"pieceCount": 0}));
        assert!(empty.is_empty());

        let no_size = SlotAssignment::from_value(&json!({"batchId": "B-1", "pieceCount": 1}));
        assert!(!no_size.is_empty());
        assert!(no_size.missing_size());

        let full = SlotAssignment::from_value(&json!({
            "batchId": "B-1",
            "pieceCount": 1,
            "sizeKey": "0",
            "sizeLengthDimension": 4.0,
            "sizeWidthDimension": 3.0,
        }));
        assert!(!full.is_empty());
        assert!(!full.missing_size());
        assert_eq!(full.size_length, Some(4.0));
    }

    #[test]
    fn cleared_slot_serializes_without_nulls() {
        let v = SlotAssignment::cleared().to_value();
        assert_eq!(v, json!({"pieceCount": 0}));
    }
}
