use actix_web::{http::StatusCode, web, web::ServiceConfig};
use fulfillment_engine::{
    db_types::OrderStatusType,
    events::EventProducers,
    traits::{FulfillmentDatabase, InventoryStore, OrderManagement},
    OrderFlowApi,
    SqliteDatabase,
};
use serde_json::json;

use super::helpers::*;
use crate::routes::{
    AdjustStockRoute,
    CustomerProfileRoute,
    InventoryLevelRoute,
    InventoryMovementsRoute,
    ManualOrderRoute,
    OrderByRefRoute,
    OrdersSearchRoute,
    RefundRoute,
    UpdateStatusRoute,
};

fn configure(db: SqliteDatabase) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        base_app_data(&db, cfg);
        cfg.service(
            web::scope("/api")
                .service(OrdersSearchRoute::<SqliteDatabase>::new())
                .service(OrderByRefRoute::<SqliteDatabase>::new())
                .service(UpdateStatusRoute::<SqliteDatabase>::new())
                .service(RefundRoute::<SqliteDatabase>::new())
                .service(ManualOrderRoute::<SqliteDatabase>::new())
                .service(InventoryLevelRoute::<SqliteDatabase>::new())
                .service(InventoryMovementsRoute::<SqliteDatabase>::new())
                .service(AdjustStockRoute::<SqliteDatabase>::new())
                .service(CustomerProfileRoute::<SqliteDatabase>::new()),
        );
    }
}

async fn settle(db: &SqliteDatabase, order: &fulfillment_engine::db_types::Order) {
    let api = OrderFlowApi::new(db.clone(), EventProducers::default(), 3);
    api.settle_order(&order.order_ref, None).await.expect("Error settling order");
}

#[actix_web::test]
async fn missing_key_is_unauthorized() {
    let _ = env_logger::try_init().ok();
    let db = test_db("staff_nokey").await;
    let (status, _) = get_request(None, "/api/orders", configure(db)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn unknown_key_is_unauthorized() {
    let _ = env_logger::try_init().ok();
    let db = test_db("staff_badkey").await;
    let (status, _) = get_request(Some("who-is-this"), "/api/orders", configure(db)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn read_only_key_cannot_write() {
    let _ = env_logger::try_init().ok();
    let db = test_db("staff_readonly").await;
    let order = seed_pending_order(&db, 1).await;
    settle(&db, &order).await;
    let path = format!("/api/orders/{}/refund", order.order_ref.as_str());
    let (status, _) = post_request(Some(READ_KEY), &path, json!({}), configure(db.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let stored = db.fetch_order_by_ref(&order.order_ref).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::Paid);
}

#[actix_web::test]
async fn order_search_and_fetch() {
    let _ = env_logger::try_init().ok();
    let db = test_db("staff_search").await;
    let order = seed_pending_order(&db, 2).await;

    let (status, body) = get_request(Some(READ_KEY), "/api/orders?status=Pending", configure(db.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let orders: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(orders.as_array().unwrap().len(), 1);

    let path = format!("/api/orders/{}", order.order_ref.as_str());
    let (status, body) = get_request(Some(READ_KEY), &path, configure(db)).await;
    assert_eq!(status, StatusCode::OK);
    let fetched: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(fetched["order_number"], order.order_number.as_str());
}

#[actix_web::test]
async fn full_shipping_flow_via_update_status() {
    let _ = env_logger::try_init().ok();
    let db = test_db("staff_ship").await;
    let order = seed_pending_order(&db, 1).await;
    settle(&db, &order).await;
    let path = format!("/api/orders/{}/status", order.order_ref.as_str());

    // Shipping without a tracking number is rejected with the transition error
    let body = json!({ "new_status": "Shipped", "carrier": "DHL" });
    let (status, _) = post_request(Some(WRITE_KEY), &path, body, configure(db.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let body = json!({ "new_status": "Shipped", "carrier": "DHL", "tracking_number": "TN-1", "shipping_cost": 5 });
    let (status, response) = post_request(Some(WRITE_KEY), &path, body, configure(db.clone())).await;
    assert_eq!(status, StatusCode::OK, "body: {response}");
    let stored = db.fetch_order_by_ref(&order.order_ref).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::Shipped);
    assert_eq!(stored.carrier.as_deref(), Some("DHL"));

    // Once shipped, staff can mark it delivered
    let body = json!({ "new_status": "Delivered" });
    let (status, _) = post_request(Some(WRITE_KEY), &path, body, configure(db.clone())).await;
    assert_eq!(status, StatusCode::OK);

    // And a delivered order is terminal: any further update names the allowed set (empty)
    let body = json!({ "new_status": "Cancelled" });
    let (status, response) = post_request(Some(WRITE_KEY), &path, body, configure(db)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(response.contains("Delivered"), "unexpected body: {response}");
}

#[actix_web::test]
async fn refund_endpoint_defaults_to_full() {
    let _ = env_logger::try_init().ok();
    let db = test_db("staff_refund").await;
    let order = seed_pending_order(&db, 2).await;
    settle(&db, &order).await;

    let path = format!("/api/orders/{}/refund", order.order_ref.as_str());
    let body = json!({ "reason": "customer returned the goods" });
    let (status, _) = post_request(Some(WRITE_KEY), &path, body, configure(db.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let stored = db.fetch_order_by_ref(&order.order_ref).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::Refunded);
    assert!(stored.notes.contains("carol"), "refund note should name the actor: {}", stored.notes);
    // Stock restored
    assert_eq!(db.fetch_level(SKU).await.unwrap().unwrap().quantity, 10);
}

#[actix_web::test]
async fn partial_refund_amount() {
    let _ = env_logger::try_init().ok();
    let db = test_db("staff_partial").await;
    let order = seed_pending_order(&db, 2).await;
    settle(&db, &order).await;

    let path = format!("/api/orders/{}/refund", order.order_ref.as_str());
    let (status, _) = post_request(Some(WRITE_KEY), &path, json!({ "amount": 10 }), configure(db.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let stored = db.fetch_order_by_ref(&order.order_ref).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::PartiallyRefunded);

    // Zero and excess amounts are rejected before any write
    let order2 = seed_pending_order(&db, 2).await;
    settle(&db, &order2).await;
    let path2 = format!("/api/orders/{}/refund", order2.order_ref.as_str());
    for bad in [json!({ "amount": 0 }), json!({ "amount": 9999 })] {
        let (status, _) = post_request(Some(WRITE_KEY), &path2, bad, configure(db.clone())).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}

#[actix_web::test]
async fn manual_order_deducts_stock_and_records_staff_member() {
    let _ = env_logger::try_init().ok();
    let db = test_db("staff_manual").await;
    let body = json!({
        "email": "walkin@example.com",
        "quantity": 2,
        "address": {
            "name": "Walk-in Customer",
            "line1": "1 Market Square",
            "city": "Cape Town",
            "postcode": "8001",
            "country": "ZA"
        },
        "reason": "paid cash"
    });
    let (status, response) = post_request(Some(WRITE_KEY), "/api/manual_order", body, configure(db.clone())).await;
    assert_eq!(status, StatusCode::OK, "body: {response}");
    let order: serde_json::Value = serde_json::from_str(&response).unwrap();
    assert_eq!(order["status"], "Paid");
    assert_eq!(order["placed_by"], "carol");
    assert_eq!(db.fetch_level(SKU).await.unwrap().unwrap().quantity, 8);
}

#[actix_web::test]
async fn inventory_endpoints() {
    let _ = env_logger::try_init().ok();
    let db = test_db("staff_inventory").await;

    let path = format!("/api/inventory/{SKU}");
    let body = json!({ "op": "add", "qty": 5, "reason": "restock delivery" });
    let (status, response) = post_request(Some(WRITE_KEY), &path, body, configure(db.clone())).await;
    assert_eq!(status, StatusCode::OK, "body: {response}");
    let result: serde_json::Value = serde_json::from_str(&response).unwrap();
    assert_eq!(result["quantity"], 15);

    let (status, response) = get_request(Some(READ_KEY), &path, configure(db.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let level: serde_json::Value = serde_json::from_str(&response).unwrap();
    assert_eq!(level["quantity"], 15);

    let path = format!("/api/inventory/{SKU}/movements");
    let (status, response) = get_request(Some(READ_KEY), &path, configure(db.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let movements: serde_json::Value = serde_json::from_str(&response).unwrap();
    assert_eq!(movements.as_array().unwrap().len(), 1);
    assert_eq!(movements[0]["movement_type"], "Add");
    assert_eq!(movements[0]["actor"], "carol");

    // Unknown SKU is a 404, not a silent create
    let (status, _) = get_request(Some(READ_KEY), "/api/inventory/NO-SUCH-SKU", configure(db)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn customer_profile_includes_lifetime_spend() {
    let _ = env_logger::try_init().ok();
    let db = test_db("staff_customer").await;
    let order = seed_pending_order(&db, 2).await;
    db.upsert_customer("alice@example.com", "Alice Tester", None).await.unwrap();
    settle(&db, &order).await;

    let (status, response) =
        get_request(Some(READ_KEY), "/api/customers/alice@example.com", configure(db)).await;
    assert_eq!(status, StatusCode::OK);
    let profile: serde_json::Value = serde_json::from_str(&response).unwrap();
    assert_eq!(profile["name"], "Alice Tester");
    assert_eq!(profile["lifetime_spend"], 24);
}
