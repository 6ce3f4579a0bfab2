//! Pure listing, filter, and dashboard helpers over already-loaded state.

use crate::model::{Batch, SlotStatus};

/// Sort batches newest arrival first. Ties break on id for a stable order.
pub fn sort_by_arrival_desc(batches: &mut [Batch]) {
    batches.sort_by(|a, b| b.arrival_ms.cmp(&a.arrival_ms).then_with(|| a.id.cmp(&b.id)));
}

/// Case-insensitive containment match on batch id. An empty or whitespace
/// query returns the full sequence unchanged.
pub fn filter_by_id_substring(batches: &[Batch], query: &str) -> Vec<Batch> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return batches.to_vec();
    }
    batches
        .iter()
        .filter(|b| b.id.to_lowercase().contains(&q))
        .cloned()
        .collect()
}

/// Batches running low: `0 < remaining < threshold`.
pub fn low_stock_count(batches: &[Batch], threshold: i64) -> usize {
    batches
        .iter()
        .filter(|b| b.remaining() > 0 && b.remaining() < threshold)
        .count()
}

/// Batches with material still available to assign.
pub fn available_count(batches: &[Batch]) -> usize {
    batches.iter().filter(|b| b.remaining() > 0).count()
}

/// Dashboard tile counts over the sensor feed. A drying slot is an active
/// one — the tiles show both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub active: usize,
    pub inactive: usize,
    pub complete: usize,
    pub drying: usize,
}

pub fn status_counts<I>(statuses: I) -> StatusCounts
where
    I: IntoIterator<Item = SlotStatus>,
{
    let mut counts = StatusCounts::default();
    for status in statuses {
        match status {
            SlotStatus::Inactive => counts.inactive += 1,
            SlotStatus::Complete => counts.complete += 1,
            SlotStatus::Active => {
                counts.active += 1;
                counts.drying += 1;
            }
        }
    }
    counts
}
