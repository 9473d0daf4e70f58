//! End-to-end order lifecycle tests against a scratch SQLite database.

mod common;

use common::*;
use fulfillment_engine::{
    db_types::{MovementType, OrderStatusType, SettlementOutcome},
    order_objects::ShipmentRequest,
    traits::{FulfillmentDatabase, InventoryStore, OrderManagement},
    OrderFlowError,
};
use sfg_common::{CoinAmount, Money};

#[tokio::test]
async fn settlement_marks_order_paid_and_decrements_stock() {
    let db = new_test_db("settlement").await;
    let api = flow_api(&db);
    // Quantity 2 at unit price 12, no discount tier reached
    let order = pending_order(&db, 2, 12).await;
    assert_eq!(order.fiat_total, Money::from(24));
    assert_status(&order, OrderStatusType::Pending);

    let outcome = api.settle_order(&order.order_ref, Some(CoinAmount::from(500_000))).await.unwrap();
    let paid = match outcome {
        SettlementOutcome::Settled(o) => o,
        SettlementOutcome::Duplicate(_) => panic!("first settlement reported as duplicate"),
    };
    assert_status(&paid, OrderStatusType::Paid);
    assert_eq!(stock_level(&db, SKU).await, 8);

    let stored = db.fetch_order_by_ref(&order.order_ref).await.unwrap().unwrap();
    assert_eq!(stored.settled_amount, Some(CoinAmount::from(500_000)));

    let movements = db.movements_for_sku(SKU).await.unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].movement_type, MovementType::Sale);
    assert_eq!(movements[0].delta, -2);
    assert_eq!(movements[0].order_ref.as_ref(), Some(&order.order_ref));
}

#[tokio::test]
async fn replayed_settlement_is_a_no_op() {
    let db = new_test_db("replay").await;
    let api = flow_api(&db);
    let order = pending_order(&db, 2, 12).await;

    let first = api.settle_order(&order.order_ref, None).await.unwrap();
    assert!(matches!(first, SettlementOutcome::Settled(_)));
    let second = api.settle_order(&order.order_ref, None).await.unwrap();
    assert!(matches!(second, SettlementOutcome::Duplicate(_)));

    // Exactly one transition and one movement, no matter how many times the webhook fires
    assert_eq!(stock_level(&db, SKU).await, 8);
    assert_eq!(db.movements_for_sku(SKU).await.unwrap().len(), 1);
    let stored = db.fetch_order_by_ref(&order.order_ref).await.unwrap().unwrap();
    assert_status(&stored, OrderStatusType::Paid);
}

#[tokio::test]
async fn settling_a_cancelled_order_is_rejected() {
    let db = new_test_db("settle_cancelled").await;
    let api = flow_api(&db);
    let order = pending_order(&db, 1, 12).await;
    api.cancel_order(&order.order_ref, "carol").await.unwrap();

    let err = api.settle_order(&order.order_ref, None).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Transition(_)), "unexpected error: {err}");
    // No stock was ever taken, none restored
    assert_eq!(stock_level(&db, SKU).await, 10);
    assert!(db.movements_for_sku(SKU).await.unwrap().is_empty());
}

#[tokio::test]
async fn cancelling_a_paid_order_restores_stock() {
    let db = new_test_db("cancel_paid").await;
    let api = flow_api(&db);
    let order = pending_order(&db, 3, 12).await;
    api.settle_order(&order.order_ref, None).await.unwrap();
    assert_eq!(stock_level(&db, SKU).await, 7);

    let cancelled = api.cancel_order(&order.order_ref, "carol").await.unwrap();
    assert_status(&cancelled, OrderStatusType::Cancelled);
    assert_eq!(stock_level(&db, SKU).await, 10);

    let movements = db.movements_for_sku(SKU).await.unwrap();
    assert_eq!(movements.len(), 2);
    assert_eq!(movements[1].movement_type, MovementType::Add);
    assert_eq!(movements[1].delta, 3);
    assert_eq!(movements[1].order_ref.as_ref(), Some(&order.order_ref));
}

#[tokio::test]
async fn cancelling_a_pending_order_leaves_inventory_alone() {
    let db = new_test_db("cancel_pending").await;
    let api = flow_api(&db);
    let order = pending_order(&db, 3, 12).await;

    let cancelled = api.cancel_order(&order.order_ref, "carol").await.unwrap();
    assert_status(&cancelled, OrderStatusType::Cancelled);
    assert_eq!(stock_level(&db, SKU).await, 10);
    assert!(db.movements_for_sku(SKU).await.unwrap().is_empty());
}

#[tokio::test]
async fn full_refund_restores_stock_and_notes_the_action() {
    let db = new_test_db("refund_full").await;
    let api = flow_api(&db);
    let order = pending_order(&db, 2, 12).await;
    api.settle_order(&order.order_ref, None).await.unwrap();

    let refunded =
        api.refund_order(&order.order_ref, None, Some("arrived damaged"), "carol").await.unwrap();
    assert_status(&refunded, OrderStatusType::Refunded);
    assert_eq!(stock_level(&db, SKU).await, 10);

    let stored = db.fetch_order_by_ref(&order.order_ref).await.unwrap().unwrap();
    assert!(stored.notes.contains("Refund of 24"));
    assert!(stored.notes.contains("carol"));
    assert!(stored.notes.contains("arrived damaged"));

    let movements = db.movements_for_sku(SKU).await.unwrap();
    assert_eq!(movements.last().unwrap().movement_type, MovementType::Refund);
    assert_eq!(movements.last().unwrap().delta, 2);
}

#[tokio::test]
async fn partial_refund_classification() {
    let db = new_test_db("refund_partial").await;
    let api = flow_api(&db);
    let order = pending_order(&db, 2, 12).await;
    api.settle_order(&order.order_ref, None).await.unwrap();

    let refunded = api.refund_order(&order.order_ref, Some(Money::from(10)), None, "carol").await.unwrap();
    assert_status(&refunded, OrderStatusType::PartiallyRefunded);
}

#[tokio::test]
async fn zero_and_excess_refunds_are_rejected() {
    let db = new_test_db("refund_bad").await;
    let api = flow_api(&db);
    let order = pending_order(&db, 2, 12).await;
    api.settle_order(&order.order_ref, None).await.unwrap();

    for amount in [Money::from(0), Money::from(25)] {
        let err = api.refund_order(&order.order_ref, Some(amount), None, "carol").await.unwrap_err();
        assert!(matches!(err, OrderFlowError::Transition(_)), "unexpected error: {err}");
    }
    let stored = db.fetch_order_by_ref(&order.order_ref).await.unwrap().unwrap();
    assert_status(&stored, OrderStatusType::Paid);
    assert_eq!(stock_level(&db, SKU).await, 8);
}

#[tokio::test]
async fn shipping_requires_carrier_and_tracking() {
    let db = new_test_db("ship_validation").await;
    let api = flow_api(&db);
    let order = pending_order(&db, 1, 12).await;
    api.settle_order(&order.order_ref, None).await.unwrap();

    let request = ShipmentRequest { carrier: "".to_string(), tracking_number: "TN123".to_string(), shipping_cost: None };
    let err = api.ship_order(&order.order_ref, &request).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Transition(_)), "unexpected error: {err}");

    let stored = db.fetch_order_by_ref(&order.order_ref).await.unwrap().unwrap();
    assert_status(&stored, OrderStatusType::Paid);
}

#[tokio::test]
async fn ship_then_poll_to_delivery() {
    let db = new_test_db("ship_deliver").await;
    let api = flow_api(&db);
    let order = pending_order(&db, 1, 12).await;
    api.settle_order(&order.order_ref, None).await.unwrap();

    let request = ShipmentRequest {
        carrier: "DHL".to_string(),
        tracking_number: "TN-4242".to_string(),
        shipping_cost: Some(Money::from(5)),
    };
    let shipped = api.ship_order(&order.order_ref, &request).await.unwrap();
    assert_status(&shipped, OrderStatusType::Shipped);
    assert_eq!(shipped.carrier.as_deref(), Some("DHL"));
    assert_eq!(shipped.tracking_number.as_deref(), Some("TN-4242"));
    assert!(shipped.shipped_at.is_some());

    // Still in transit: sweep persists the snapshot but does not advance the order
    let report = api.poll_deliveries(&StubTracker::in_transit()).await.unwrap();
    assert_eq!(report.checked, 1);
    assert!(report.delivered.is_empty());
    let stored = db.fetch_order_by_ref(&order.order_ref).await.unwrap().unwrap();
    assert_status(&stored, OrderStatusType::Shipped);
    assert_eq!(stored.tracking_status.as_deref(), Some("InTransit"));

    // Delivered: sweep advances the order
    let report = api.poll_deliveries(&StubTracker::delivered()).await.unwrap();
    assert_eq!(report.delivered, vec![order.order_ref.clone()]);
    let stored = db.fetch_order_by_ref(&order.order_ref).await.unwrap().unwrap();
    assert_status(&stored, OrderStatusType::Delivered);
}

#[tokio::test]
async fn tracking_failures_are_isolated_per_order() {
    let db = new_test_db("sweep_isolation").await;
    let api = flow_api(&db);
    let order_a = pending_order(&db, 1, 12).await;
    let order_b = pending_order(&db, 1, 12).await;
    for order in [&order_a, &order_b] {
        api.settle_order(&order.order_ref, None).await.unwrap();
    }
    let ship_a =
        ShipmentRequest { carrier: "DHL".to_string(), tracking_number: "TN-A".to_string(), shipping_cost: None };
    let ship_b =
        ShipmentRequest { carrier: "DHL".to_string(), tracking_number: "TN-B".to_string(), shipping_cost: None };
    api.ship_order(&order_a.order_ref, &ship_a).await.unwrap();
    api.ship_order(&order_b.order_ref, &ship_b).await.unwrap();

    let mut tracker = StubTracker::delivered();
    tracker.fail_for = Some("TN-A".to_string());
    let report = api.poll_deliveries(&tracker).await.unwrap();
    assert_eq!(report.checked, 2);
    assert_eq!(report.delivered, vec![order_b.order_ref.clone()]);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].order_ref, order_a.order_ref);

    // The failing order is untouched and will be retried on the next sweep
    let stored = db.fetch_order_by_ref(&order_a.order_ref).await.unwrap().unwrap();
    assert_status(&stored, OrderStatusType::Shipped);
}

#[tokio::test]
async fn expiry_sweep_only_takes_stale_pending_orders() {
    let db = new_test_db("expiry").await;
    let api = flow_api(&db);
    let stale = pending_order(&db, 1, 12).await;
    let fresh = pending_order(&db, 1, 12).await;
    let paid_but_old = pending_order(&db, 1, 12).await;
    api.settle_order(&paid_but_old.order_ref, None).await.unwrap();

    age_order(&db, &stale.order_ref, 25).await;
    age_order(&db, &fresh.order_ref, 23).await;
    age_order(&db, &paid_but_old.order_ref, 30).await;

    let expired = api.expire_old_orders(chrono::Duration::hours(24)).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].order_ref, stale.order_ref);

    assert_status(&db.fetch_order_by_ref(&stale.order_ref).await.unwrap().unwrap(), OrderStatusType::Expired);
    assert_status(&db.fetch_order_by_ref(&fresh.order_ref).await.unwrap().unwrap(), OrderStatusType::Pending);
    assert_status(&db.fetch_order_by_ref(&paid_but_old.order_ref).await.unwrap().unwrap(), OrderStatusType::Paid);
}

#[tokio::test]
async fn manual_orders_are_born_paid_and_deduct_stock_inline() {
    let db = new_test_db("manual").await;
    let api = flow_api(&db);
    let request = fulfillment_engine::order_objects::ManualOrderRequest {
        email: "walkin@example.com".to_string(),
        address: test_address(),
        quantity: 2,
        reason: Some("paid cash at the market stall".to_string()),
    };
    let order = api.create_manual_order(&request, "carol", &settings()).await.unwrap();
    assert_status(&order, OrderStatusType::Paid);
    assert_eq!(order.placed_by.as_deref(), Some("carol"));
    assert!(order.payment_address.is_none());
    assert_eq!(stock_level(&db, SKU).await, 8);

    let movements = db.movements_for_sku(SKU).await.unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].movement_type, MovementType::Sale);
    assert_eq!(movements[0].actor, "carol");
}

#[tokio::test]
async fn settlement_publishes_exactly_one_paid_event() {
    use std::{
        pin::Pin,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use fulfillment_engine::events::{EventHandlers, EventHooks};

    let db = new_test_db("paid_event").await;
    let published = Arc::new(AtomicUsize::new(0));
    let p2 = Arc::clone(&published);
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(move |_event| {
        let published = Arc::clone(&p2);
        Box::pin(async move {
            published.fetch_add(1, Ordering::SeqCst);
        }) as Pin<Box<dyn std::future::Future<Output = ()> + Send>>
    });
    let handlers = EventHandlers::new(8, hooks);
    let api = fulfillment_engine::OrderFlowApi::new(db.clone(), handlers.producers(), 3);

    let order = pending_order(&db, 1, 12).await;
    api.settle_order(&order.order_ref, None).await.unwrap();
    // The duplicate must not notify anyone a second time
    api.settle_order(&order.order_ref, None).await.unwrap();
    drop(api);
    handlers.start_handlers().await;
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(published.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn terminal_orders_reject_every_transition() {
    let db = new_test_db("terminal").await;
    let api = flow_api(&db);
    let order = pending_order(&db, 1, 12).await;
    api.settle_order(&order.order_ref, None).await.unwrap();
    api.refund_order(&order.order_ref, None, None, "carol").await.unwrap();

    assert!(api.cancel_order(&order.order_ref, "carol").await.is_err());
    assert!(api.mark_processing(&order.order_ref).await.is_err());
    assert!(api.refund_order(&order.order_ref, None, None, "carol").await.is_err());
    let request =
        ShipmentRequest { carrier: "DHL".to_string(), tracking_number: "TN".to_string(), shipping_cost: None };
    assert!(api.ship_order(&order.order_ref, &request).await.is_err());
}

#[tokio::test]
async fn notes_survive_terminal_status() {
    let db = new_test_db("notes").await;
    let api = flow_api(&db);
    let order = pending_order(&db, 1, 12).await;
    api.settle_order(&order.order_ref, None).await.unwrap();
    api.refund_order(&order.order_ref, None, Some("first note"), "carol").await.unwrap();

    // Notes stay appendable after the order is terminal
    db.append_note(&order.order_ref, "[later] chargeback inquiry resolved\n").await.unwrap();
    let stored = db.fetch_order_by_ref(&order.order_ref).await.unwrap().unwrap();
    assert!(stored.notes.contains("first note"));
    assert!(stored.notes.contains("chargeback inquiry resolved"));
}
