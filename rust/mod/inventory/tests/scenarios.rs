//! End-to-end scenarios: service commands and the sensor-driven rack
//! supervisor running against the in-memory ledger.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;

use drysync_inventory::slot::{self, PromptFn, PromptKind, SlotPrompt};
use drysync_inventory::{InventoryService, NewSizeLine, schema};
use drysync_store::{LedgerStore, MemoryStore, WriteBatch};

fn service() -> Arc<InventoryService> {
    Arc::new(InventoryService::new(Arc::new(MemoryStore::new()), 8))
}

async fn push_status(store: &Arc<dyn LedgerStore>, slot: u32, status: &str) {
    store
        .apply(WriteBatch::new().set(schema::sensor_status(slot), json!(status)))
        .await
        .unwrap();
}

/// Poll until `check` passes or the deadline hits.
async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within deadline");
}

#[tokio::test(flavor = "multi_thread")]
async fn finish_flow_for_a_plain_batch() {
    let svc = service();
    let store = svc.store();
    let kinds: Arc<std::sync::Mutex<Vec<PromptKind>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
    let prompt: PromptFn = {
        let kinds = Arc::clone(&kinds);
        Arc::new(move |p: SlotPrompt| kinds.lock().unwrap().push(p.kind))
    };
    let cancel = slot::start(svc.store(), svc.reconciler(), prompt, 10);

    let id = svc.create_batch_legacy(10, 1735689600000).await.unwrap();
    svc.assign_batch_only(&id, 3, 1).await.unwrap();

    let b = svc.list_batches().await.unwrap().remove(0);
    assert_eq!((b.in_rack_count(), b.remaining()), (1, 9));

    // Sensor reports the slot loaded and drying, then done. The Complete
    // push prompts the operator, who confirms via the same finish path.
    push_status(&store, 3, "Active").await;
    push_status(&store, 3, "Complete").await;
    wait_until(|| {
        let kinds = Arc::clone(&kinds);
        async move { kinds.lock().unwrap().contains(&PromptKind::ConfirmFinish) }
    })
    .await;
    svc.finish_slot(3).await.unwrap();

    let b = svc.list_batches().await.unwrap().remove(0);
    assert_eq!(b.in_rack_count(), 0);
    assert_eq!(b.finished_count(), 1);
    assert_eq!(b.remaining(), 9);

    // Back to Inactive with nothing assigned: the auto action is a benign
    // no-op and the counters stay put.
    push_status(&store, 3, "Inactive").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let b = svc.list_batches().await.unwrap().remove(0);
    assert_eq!((b.in_rack_count(), b.finished_count(), b.remaining()), (0, 1, 9));

    cancel.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn inactive_after_complete_auto_finishes() {
    let svc = service();
    let store = svc.store();
    let cancel = slot::start(svc.store(), svc.reconciler(), Arc::new(|_| {}), 10);

    let id = svc.create_batch_legacy(4, 1).await.unwrap();
    svc.assign_batch_only(&id, 5, 1).await.unwrap();

    push_status(&store, 5, "Active").await;
    push_status(&store, 5, "Complete").await;
    push_status(&store, 5, "Inactive").await;

    let svc2 = Arc::clone(&svc);
    wait_until(move || {
        let svc = Arc::clone(&svc2);
        async move {
            let b = svc.list_batches().await.unwrap().remove(0);
            b.finished_count() == 1 && b.in_rack_count() == 0
        }
    })
    .await;

    assert!(svc.slot_assignment(5).await.unwrap().is_empty());
    cancel.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn inactive_before_complete_returns_material() {
    let svc = service();
    let store = svc.store();
    let cancel = slot::start(svc.store(), svc.reconciler(), Arc::new(|_| {}), 10);

    let id = svc
        .create_batch(&[NewSizeLine { quantity: 5, length_dimension: 4.0, width_dimension: 3.0 }], 1)
        .await
        .unwrap();
    svc.assign_batch_and_size(&id, 2, "0").await.unwrap();

    // Removed before drying completed: material returns to remaining.
    push_status(&store, 2, "Active").await;
    push_status(&store, 2, "Inactive").await;

    let svc2 = Arc::clone(&svc);
    let id2 = id.clone();
    wait_until(move || {
        let svc = Arc::clone(&svc2);
        let id = id2.clone();
        async move {
            let lines = svc.load_size_lines(&id).await.unwrap();
            lines[0].in_rack() == 0 && lines[0].finished() == 0
        }
    })
    .await;

    let b = svc.list_batches().await.unwrap().remove(0);
    assert_eq!(b.remaining(), 5);
    cancel.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_active_pushes_prompt_once() {
    let svc = service();
    let store = svc.store();
    let prompts = Arc::new(AtomicUsize::new(0));
    let kinds: Arc<std::sync::Mutex<Vec<PromptKind>>> = Arc::new(std::sync::Mutex::new(Vec::new()));

    let prompt: PromptFn = {
        let prompts = Arc::clone(&prompts);
        let kinds = Arc::clone(&kinds);
        Arc::new(move |p: SlotPrompt| {
            prompts.fetch_add(1, Ordering::SeqCst);
            kinds.lock().unwrap().push(p.kind);
        })
    };
    let cancel = slot::start(svc.store(), svc.reconciler(), prompt, 10);

    push_status(&store, 7, "Active").await;
    push_status(&store, 7, "Active").await;
    push_status(&store, 7, "Active").await;

    wait_until(|| {
        let prompts = Arc::clone(&prompts);
        async move { prompts.load(Ordering::SeqCst) >= 1 }
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(prompts.load(Ordering::SeqCst), 1);
    assert_eq!(*kinds.lock().unwrap(), vec![PromptKind::AssignBatch]);
    cancel.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn size_reassignment_within_a_batch_keeps_the_debit_single() {
    let svc = service();

    let id = svc
        .create_batch(
            &[
                NewSizeLine { quantity: 5, length_dimension: 4.0, width_dimension: 3.0 },
                NewSizeLine { quantity: 5, length_dimension: 8.0, width_dimension: 2.0 },
            ],
            1,
        )
        .await
        .unwrap();

    svc.assign_batch_and_size(&id, 7, "0").await.unwrap();
    let lines = svc.load_size_lines(&id).await.unwrap();
    assert_eq!((lines[0].in_rack(), lines[1].in_rack()), (1, 0));

    svc.assign_batch_and_size(&id, 7, "1").await.unwrap();
    let lines = svc.load_size_lines(&id).await.unwrap();
    assert_eq!((lines[0].in_rack(), lines[1].in_rack()), (0, 1));

    let b = svc.list_batches().await.unwrap().remove(0);
    assert_eq!(b.in_rack_count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn query_layer_matches_dashboard_semantics() {
    let svc = service();
    let a = svc.create_batch_legacy(20, 100).await.unwrap();
    let _b = svc.create_batch_legacy(20, 200).await.unwrap();

    // Drive batch A down to remaining == 3.
    for slot in 1..=17 {
        svc.assign_batch_only(&a, slot, 1).await.unwrap();
    }
    let batches = svc.list_batches().await.unwrap();
    assert_eq!(drysync_inventory::available_count(&batches), 2);
    assert_eq!(drysync_inventory::low_stock_count(&batches, 10), 1);
    assert_eq!(drysync_inventory::filter_by_id_substring(&batches, &a).len(), 1);
}
