use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use drysync_store::LedgerStore;

use crate::model::{SlotAssignment, SlotStatus};
use crate::reconciler::Reconciler;
use crate::schema;

// ---------------------------------------------------------------------------
// Prompts — operator-facing side effects
// ---------------------------------------------------------------------------

/// What the operator is being asked to do for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Slot went Active while unassigned: pick a batch, then a size.
    AssignBatch,
    /// Slot is assigned but the size selection is missing.
    PickSize,
    /// Slot reported Complete: confirm finishing the material.
    ConfirmFinish,
}

/// A prompt surfaced to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotPrompt {
    pub slot_id: u32,
    pub kind: PromptKind,
}

/// Callback fired when a slot needs operator input. Implementations must be
/// non-blocking (fire-and-forget) — the slot task does not wait for the
/// dialog to resolve; resolution arrives as a normal service command.
pub type PromptFn = Arc<dyn Fn(SlotPrompt) + Send + Sync>;

// ---------------------------------------------------------------------------
// SlotMachine — pure per-slot transition logic
// ---------------------------------------------------------------------------

/// Action produced by a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotAction {
    Prompt(PromptKind),
    /// Material removed after drying finished: move in-rack → finished.
    AutoFinish,
    /// Material removed before completion: return it to remaining.
    AutoClear,
}

/// Per-slot status state machine.
///
/// ```text
/// prev            new        action
/// not Active   →  Active     prompt assignment (if unassigned / no size)
/// not Complete →  Complete   prompt finish (if assigned)
/// not Inactive →  Inactive   auto finish (from Complete) / auto clear
/// ```
///
/// Each slot owns one machine instance; the prompt guards and the
/// action-in-flight flag live here, not in any ambient global set, so
/// their lifetime is the machine's. Guards clear when the slot leaves the
/// state that set them, which is what makes every action fire at most once
/// per entry into its state.
#[derive(Debug)]
pub struct SlotMachine {
    slot_id: u32,
    status: SlotStatus,
    prompted_assign: bool,
    prompted_finish: bool,
    in_flight: bool,
}

impl SlotMachine {
    pub fn new(slot_id: u32) -> Self {
        Self {
            slot_id,
            status: SlotStatus::Inactive,
            prompted_assign: false,
            prompted_finish: false,
            in_flight: false,
        }
    }

    pub fn slot_id(&self) -> u32 {
        self.slot_id
    }

    pub fn status(&self) -> SlotStatus {
        self.status
    }

    /// Feed a sensor status together with the slot's current assignment;
    /// returns the action the driver should run, if any.
    pub fn observe(&mut self, new: SlotStatus, assignment: &SlotAssignment) -> Option<SlotAction> {
        let prev = self.status;
        self.status = new;
        if prev == new {
            return None;
        }

        match new {
            SlotStatus::Active => {
                self.prompted_finish = false;
                if self.prompted_assign {
                    return None;
                }
                let kind = if assignment.is_empty() {
                    PromptKind::AssignBatch
                } else if assignment.missing_size() {
                    PromptKind::PickSize
                } else {
                    return None;
                };
                self.prompted_assign = true;
                Some(SlotAction::Prompt(kind))
            }
            SlotStatus::Complete => {
                self.prompted_assign = false;
                if self.prompted_finish || assignment.is_empty() {
                    // Unassigned slot reporting Complete is informational only.
                    return None;
                }
                self.prompted_finish = true;
                Some(SlotAction::Prompt(PromptKind::ConfirmFinish))
            }
            SlotStatus::Inactive => {
                self.prompted_assign = false;
                self.prompted_finish = false;
                if prev == SlotStatus::Complete {
                    Some(SlotAction::AutoFinish)
                } else {
                    Some(SlotAction::AutoClear)
                }
            }
        }
    }

    /// Idempotent re-entry point for a tap on an Active slot: re-open the
    /// step the assignment is missing, without a status transition.
    pub fn reopen_prompt(&self, assignment: &SlotAssignment) -> Option<PromptKind> {
        if self.status != SlotStatus::Active {
            return None;
        }
        if assignment.is_empty() {
            Some(PromptKind::AssignBatch)
        } else if assignment.missing_size() {
            Some(PromptKind::PickSize)
        } else {
            None
        }
    }

    /// Claim the slot's action slot. Returns false when another action is
    /// already outstanding — the new trigger is dropped, not queued.
    pub fn begin_action(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    pub fn finish_action(&mut self) {
        self.in_flight = false;
    }
}

// ---------------------------------------------------------------------------
// RackSupervisor — one task per slot, driven by the sensor feed
// ---------------------------------------------------------------------------

/// Drives one [`SlotMachine`] per rack slot off the store's sensor feed.
///
/// Each slot runs its own task: sensor pushes arrive through a store
/// subscription, automatic actions execute inline (serializing reconciler
/// calls per slot), prompts fan out through the supplied [`PromptFn`].
/// Returns a CancellationToken that stops all slot tasks.
pub fn start(
    store: Arc<dyn LedgerStore>,
    reconciler: Arc<Reconciler>,
    prompt: PromptFn,
    slot_count: u32,
) -> CancellationToken {
    let cancel = CancellationToken::new();

    for slot_id in 1..=slot_count {
        let store = Arc::clone(&store);
        let reconciler = Arc::clone(&reconciler);
        let prompt = Arc::clone(&prompt);
        let cancel = cancel.clone();
        // Subscribe before spawning so no push can slip past startup.
        let mut feed = store.subscribe(&schema::sensor_status(slot_id));

        tokio::spawn(async move {
            let mut machine = SlotMachine::new(slot_id);
            debug!(slot = slot_id, "slot watcher started");

            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(slot = slot_id, "slot watcher stopped");
                        break;
                    }
                    ev = feed.recv() => match ev {
                        Some(ev) => ev,
                        None => {
                            debug!(slot = slot_id, "sensor feed closed");
                            break;
                        }
                    },
                };

                let Some(status) = SlotStatus::from_value(event.value.as_ref()) else {
                    continue;
                };
                let assignment = match reconciler.load_slot(slot_id).await {
                    Ok(a) => a,
                    Err(e) => {
                        warn!(slot = slot_id, "slot read failed: {e}");
                        continue;
                    }
                };

                let Some(action) = machine.observe(status, &assignment) else {
                    continue;
                };
                match action {
                    SlotAction::Prompt(kind) => {
                        info!(slot = slot_id, ?kind, "prompting operator");
                        prompt(SlotPrompt { slot_id, kind });
                    }
                    SlotAction::AutoFinish | SlotAction::AutoClear => {
                        if !machine.begin_action() {
                            debug!(slot = slot_id, "action already in flight, dropping trigger");
                            continue;
                        }
                        run_auto_action(&store, &reconciler, slot_id, action).await;
                        machine.finish_action();
                    }
                }
            }
        });
    }

    cancel
}

/// Execute an automatic finish/clear, re-checking the sensor first: a
/// status that moved on since the trigger supersedes the action, which is
/// skipped silently.
async fn run_auto_action(
    store: &Arc<dyn LedgerStore>,
    reconciler: &Reconciler,
    slot_id: u32,
    action: SlotAction,
) {
    let current = store
        .read(&schema::sensor_status(slot_id))
        .await
        .ok()
        .flatten();
    if SlotStatus::from_value(current.as_ref()) != Some(SlotStatus::Inactive) {
        debug!(slot = slot_id, "status moved on, skipping auto action");
        return;
    }

    let result = match action {
        SlotAction::AutoFinish => reconciler.finish_slot(slot_id).await,
        _ => reconciler.clear_slot(slot_id).await,
    };
    match result {
        Ok(()) => {}
        Err(e) if e.is_slot_empty() => {
            debug!(slot = slot_id, "slot already empty, nothing to do");
        }
        Err(e) => warn!(slot = slot_id, "auto action failed: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
