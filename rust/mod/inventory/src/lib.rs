//! DrySync inventory engine.
//!
//! Tracks lumber batches through a physical drying process: per-batch and
//! per-size-line counters under a conservation invariant, race-safe rack
//! slot assignment through the reconciler's delta scheduling, and a
//! sensor-driven state machine per slot.

pub mod idgen;
pub mod model;
pub mod query;
pub mod reconciler;
pub mod schema;
pub mod service;
pub mod slot;

pub use idgen::SequenceGenerator;
pub use model::{Batch, SizeLine, SlotAssignment, SlotStatus};
pub use query::{StatusCounts, available_count, filter_by_id_substring, low_stock_count, status_counts};
pub use reconciler::Reconciler;
pub use service::{BatchWatch, EnvironmentReading, InventoryService, NewSizeLine};
pub use slot::{PromptFn, PromptKind, SlotAction, SlotMachine, SlotPrompt};
