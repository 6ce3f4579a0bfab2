//! Ledger tree layout.
//!
//! ```text
//! batches/{batchId}                 { totalQuantity, inRackCount, finishedCount, arrivalTime }
//! batches/{batchId}/sizes/{key}     { quantity, lengthDimension, widthDimension, inRack, finished }
//! counters/batches/{dateKey}        integer sequence counter
//! rackSlots/{slotId}                { batchId, pieceCount, sizeKey, sizeLengthDimension, sizeWidthDimension }
//! sensors/{slotId}/status           "Inactive" | "Active" | "Complete"
//! sensors/{slotId}/value            numeric reading (display-only)
//! environment/{temperature,humidity}
//! ```

use drysync_store::Path;

/// Wire field names, including the legacy aliases accepted on read.
pub mod field {
    pub const TOTAL_QUANTITY: &str = "totalQuantity";
    pub const IN_RACK_COUNT: &str = "inRackCount";
    pub const FINISHED_COUNT: &str = "finishedCount";
    pub const ARRIVAL_TIME: &str = "arrivalTime";
    pub const ARRIVAL_TIME_LEGACY: &str = "arrivalDateMillis";

    pub const QUANTITY: &str = "quantity";
    pub const LENGTH_DIMENSION: &str = "lengthDimension";
    pub const WIDTH_DIMENSION: &str = "widthDimension";
    pub const LENGTH_LEGACY: &str = "lengthFt";
    pub const WIDTH_LEGACY: &str = "widthIn";
    // Size-line counters use the short names; they double as the batch-level
    // legacy aliases.
    pub const IN_RACK: &str = "inRack";
    pub const FINISHED: &str = "finished";

    pub const BATCH_ID: &str = "batchId";
    pub const PIECE_COUNT: &str = "pieceCount";
    pub const SIZE_KEY: &str = "sizeKey";
    pub const SIZE_LENGTH: &str = "sizeLengthDimension";
    pub const SIZE_WIDTH: &str = "sizeWidthDimension";
}

pub fn batches_root() -> Path {
    Path::new("batches")
}

pub fn batch(batch_id: &str) -> Path {
    batches_root().child(batch_id)
}

pub fn batch_field(batch_id: &str, field: &str) -> Path {
    batch(batch_id).child(field)
}

pub fn sizes(batch_id: &str) -> Path {
    batch(batch_id).child("sizes")
}

pub fn size_line(batch_id: &str, size_key: &str) -> Path {
    sizes(batch_id).child(size_key)
}

pub fn size_line_field(batch_id: &str, size_key: &str, field: &str) -> Path {
    size_line(batch_id, size_key).child(field)
}

pub fn counters_root() -> Path {
    Path::new("counters/batches")
}

pub fn day_counter(date_key: &str) -> Path {
    counters_root().child(date_key)
}

pub fn rack_slot(slot_id: u32) -> Path {
    Path::new("rackSlots").child(&slot_id.to_string())
}

pub fn sensors_root() -> Path {
    Path::new("sensors")
}

pub fn sensor_status(slot_id: u32) -> Path {
    sensors_root().child(&slot_id.to_string()).child("status")
}

pub fn sensor_value(slot_id: u32) -> Path {
    sensors_root().child(&slot_id.to_string()).child("value")
}

pub fn environment_temperature() -> Path {
    Path::new("environment/temperature")
}

pub fn environment_humidity() -> Path {
    Path::new("environment/humidity")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_match_the_ledger_layout() {
        assert_eq!(batch("B-20250101-0001").as_str(), "batches/B-20250101-0001");
        assert_eq!(
            size_line_field("B-1", "0", field::IN_RACK).as_str(),
            "batches/B-1/sizes/0/inRack"
        );
        assert_eq!(day_counter("20250101").as_str(), "counters/batches/20250101");
        assert_eq!(rack_slot(3).as_str(), "rackSlots/3");
        assert_eq!(sensor_status(10).as_str(), "sensors/10/status");
    }
}
