use std::sync::Arc;

use chrono::{FixedOffset, TimeZone, Utc};
use rand::Rng;
use serde_json::Value;
use tracing::warn;

use drysync_core::now_millis;
use drysync_store::value::as_i64_lenient;
use drysync_store::{LedgerStore, WriteBatch};

use crate::schema;

/// Produces collision-free batch identifiers of the shape
/// `B-<dateKey>-<sequence>`: an 8-digit date in the operational time zone
/// and a per-day counter starting at 1, allocated through the store's
/// serialized read-modify-write.
///
/// When the counter commit fails, batch creation still succeeds with a
/// randomized 4-digit suffix — availability over strict sequencing. The
/// random id can collide with a future sequenced one; known gap, kept as
/// is.
pub struct SequenceGenerator {
    store: Arc<dyn LedgerStore>,
    offset: FixedOffset,
}

impl SequenceGenerator {
    pub fn new(store: Arc<dyn LedgerStore>, utc_offset_hours: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"));
        Self { store, offset }
    }

    /// The 8-digit date key for an epoch-millis instant, in the
    /// operational zone.
    pub fn date_key(&self, epoch_ms: i64) -> String {
        let utc = Utc
            .timestamp_millis_opt(epoch_ms)
            .single()
            .unwrap_or_else(Utc::now);
        utc.with_timezone(&self.offset).format("%Y%m%d").to_string()
    }

    /// Today's date key in the operational zone.
    pub fn today_key(&self) -> String {
        self.date_key(now_millis())
    }

    /// Allocate the next batch id. Never fails: a counter-commit error
    /// falls back to a randomized suffix.
    pub async fn next_batch_id(&self) -> String {
        let date_key = self.today_key();
        let counter = schema::day_counter(&date_key);

        match self
            .store
            .transact(&counter, &|current| {
                let next = current.as_ref().and_then(as_i64_lenient).unwrap_or(0) + 1;
                Value::from(next)
            })
            .await
        {
            Ok(committed) => {
                let seq = as_i64_lenient(&committed).unwrap_or(1);
                format!("B-{date_key}-{seq:04}")
            }
            Err(e) => {
                let serial: i64 = rand::thread_rng().gen_range(1000..=9999);
                warn!("batch counter not committed ({e}), using randomized id suffix {serial}");
                format!("B-{date_key}-{serial}")
            }
        }
    }

    /// Housekeeping: delete every day counter except `keep_date_key`.
    /// Best-effort — failures are logged and ignored.
    pub async fn cleanup_old_counters(&self, keep_date_key: &str) {
        let root = schema::counters_root();
        let snapshot = match self.store.read(&root).await {
            Ok(Some(v)) => v,
            Ok(None) => return,
            Err(e) => {
                warn!("counter cleanup read failed: {e}");
                return;
            }
        };

        let Some(days) = snapshot.as_object() else {
            return;
        };
        let mut batch = WriteBatch::new();
        for day in days.keys() {
            if day != keep_date_key {
                batch = batch.remove(root.child(day));
            }
        }
        if batch.is_empty() {
            return;
        }
        if let Err(e) = self.store.apply(batch).await {
            warn!("counter cleanup write failed: {e}");
        }
    }
}
