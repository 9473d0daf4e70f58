//! Concurrency tests for the inventory ledger: many writers, one quantity, no pessimistic locks.

mod common;

use std::sync::Arc;

use common::*;
use fulfillment_engine::{
    db_types::StockAdjustment,
    events::EventProducers,
    traits::{InventoryError, InventoryStore},
    InventoryApi,
};

const WRITERS: usize = 20;

#[tokio::test]
async fn concurrent_sales_never_drive_stock_negative() {
    let db = new_test_db("burst").await;
    // new_test_db provisions 10; the interesting case is more writers than stock
    let api = Arc::new(InventoryApi::new(db.clone(), EventProducers::default(), 0));

    let mut handles = Vec::with_capacity(WRITERS);
    for i in 0..WRITERS {
        let api = Arc::clone(&api);
        handles.push(tokio::spawn(async move {
            api.adjust(SKU, StockAdjustment::Sale(1), "burst test", &format!("writer-{i}"), None).await
        }));
    }
    let mut successes = 0usize;
    let mut rejections = 0usize;
    for handle in handles {
        match handle.await.expect("writer panicked") {
            Ok(new_quantity) => {
                assert!(new_quantity >= 0, "quantity went negative: {new_quantity}");
                successes += 1;
            },
            Err(InventoryError::Conflict { .. }) | Err(InventoryError::Depleted { .. }) => rejections += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(successes + rejections, WRITERS);
    assert!(successes <= 10, "sold more than the available stock: {successes}");

    let final_level = stock_level(&db, SKU).await;
    assert!(final_level >= 0, "stored quantity went negative: {final_level}");
    assert_eq!(final_level, 10 - successes as i64);

    // Exactly one movement per successful decrement, and the log replays to the stored quantity
    let movements = db.movements_for_sku(SKU).await.unwrap();
    assert_eq!(movements.len(), successes);
    assert!(movements.iter().all(|m| m.delta == -1));
    let (replayed, stored) = api.reconcile(SKU).await.unwrap();
    assert_eq!(replayed, stored);
}

#[tokio::test]
async fn movement_log_replays_to_current_quantity() {
    let db = new_test_db("reconcile").await;
    let api = InventoryApi::new(db.clone(), EventProducers::default(), 0);

    api.adjust(SKU, StockAdjustment::Sale(4), "sold", "system/webhook", None).await.unwrap();
    api.adjust(SKU, StockAdjustment::Refund(2), "refunded", "carol", None).await.unwrap();
    api.adjust(SKU, StockAdjustment::Add(5), "restock", "carol", None).await.unwrap();
    api.adjust(SKU, StockAdjustment::SetTo(7), "stocktake correction", "carol", None).await.unwrap();
    api.adjust(SKU, StockAdjustment::Remove(3), "damaged in storage", "carol", None).await.unwrap();

    let (replayed, stored) = api.reconcile(SKU).await.unwrap();
    assert_eq!(stored, 4);
    assert_eq!(replayed, stored);

    let movements = db.movements_for_sku(SKU).await.unwrap();
    assert_eq!(movements.len(), 5);
    // Before/after snapshots chain together
    for pair in movements.windows(2) {
        assert_eq!(pair[0].quantity_after, pair[1].quantity_before);
    }
}

#[tokio::test]
async fn removals_clip_at_zero() {
    let db = new_test_db("clip").await;
    let api = InventoryApi::new(db.clone(), EventProducers::default(), 0);

    let q = api.adjust(SKU, StockAdjustment::Sale(15), "oversold", "system/webhook", None).await.unwrap();
    assert_eq!(q, 0);
    let movements = db.movements_for_sku(SKU).await.unwrap();
    assert_eq!(movements[0].delta, -10, "clip should remove only what was there");

    // Nothing left: further removals are rejections, not zero-delta movements
    let err = api.adjust(SKU, StockAdjustment::Sale(1), "oversold again", "system/webhook", None).await.unwrap_err();
    assert!(matches!(err, InventoryError::Depleted { .. }), "unexpected error: {err}");
    assert_eq!(db.movements_for_sku(SKU).await.unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_sku_is_reported_not_created() {
    let db = new_test_db("missing_sku").await;
    let api = InventoryApi::new(db.clone(), EventProducers::default(), 0);
    let err = api.adjust("NO-SUCH-SKU", StockAdjustment::Add(5), "restock", "carol", None).await.unwrap_err();
    assert!(matches!(err, InventoryError::SkuNotFound(_)), "unexpected error: {err}");
}

#[tokio::test]
async fn low_stock_event_fires_below_threshold() {
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use fulfillment_engine::events::{EventHandlers, EventHooks};

    let db = new_test_db("low_stock").await;
    let fired = Arc::new(AtomicUsize::new(0));
    let f2 = Arc::clone(&fired);
    let mut hooks = EventHooks::default();
    hooks.on_low_stock(move |event| {
        let fired = Arc::clone(&f2);
        Box::pin(async move {
            assert_eq!(event.sku, SKU);
            fired.fetch_add(1, Ordering::SeqCst);
        }) as Pin<Box<dyn std::future::Future<Output = ()> + Send>>
    });
    let handlers = EventHandlers::new(8, hooks);
    let api = InventoryApi::new(db.clone(), handlers.producers(), 3);

    // 10 -> 8: above threshold, no event. 8 -> 2: below, one event.
    api.adjust(SKU, StockAdjustment::Sale(2), "sold", "system/webhook", None).await.unwrap();
    api.adjust(SKU, StockAdjustment::Sale(6), "sold", "system/webhook", None).await.unwrap();
    drop(api);
    handlers.start_handlers().await;
    // Give the spawned handler a moment to drain
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}
