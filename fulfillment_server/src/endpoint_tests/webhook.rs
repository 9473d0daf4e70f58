use actix_web::{http::StatusCode, web, web::ServiceConfig};
use fulfillment_engine::{
    db_types::OrderStatusType,
    traits::{InventoryStore, OrderManagement},
    SqliteDatabase,
};
use sfg_common::CoinAmount;

use super::helpers::*;
use crate::{config::WebhookOptions, routes::PaymentUpdateRoute};

fn configure(db: SqliteDatabase) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        base_app_data(&db, cfg);
        cfg.service(web::scope("/shop").service(PaymentUpdateRoute::<SqliteDatabase>::new()));
    }
}

#[actix_web::test]
async fn unconfigured_secret_fails_closed() {
    let _ = env_logger::try_init().ok();
    let db = test_db("wh_unconfigured").await;
    let order = seed_pending_order(&db, 2).await;
    let path = format!("/shop/payment_update?ref={}&pending=0&secret=anything", order.order_ref.as_str());
    let db2 = db.clone();
    let (status, _) = get_request(None, &path, move |cfg| {
        base_app_data(&db2, cfg);
        // fail-closed: no webhook secret configured
        cfg.app_data(web::Data::new(WebhookOptions { secret: None }));
        cfg.service(web::scope("/shop").service(PaymentUpdateRoute::<SqliteDatabase>::new()));
    })
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let stored = db.fetch_order_by_ref(&order.order_ref).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::Pending);
}

#[actix_web::test]
async fn invalid_secret_is_rejected_without_ack() {
    let _ = env_logger::try_init().ok();
    let db = test_db("wh_bad_secret").await;
    let order = seed_pending_order(&db, 2).await;
    let path = format!("/shop/payment_update?ref={}&pending=0&secret=wrong", order.order_ref.as_str());
    let (status, body) = get_request(None, &path, configure(db.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_ne!(body, "OK");
    let stored = db.fetch_order_by_ref(&order.order_ref).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::Pending);
}

#[actix_web::test]
async fn settlement_acks_and_marks_paid() {
    let _ = env_logger::try_init().ok();
    let db = test_db("wh_settle").await;
    let order = seed_pending_order(&db, 2).await;
    let path = format!(
        "/shop/payment_update?ref={}&pending=0&amount=0.5&secret={WEBHOOK_SECRET}",
        order.order_ref.as_str()
    );
    let (status, body) = get_request(None, &path, configure(db.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    let stored = db.fetch_order_by_ref(&order.order_ref).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::Paid);
    assert_eq!(stored.settled_amount, Some(CoinAmount::from(500_000)));
    let level = db.fetch_level(SKU).await.unwrap().unwrap();
    assert_eq!(level.quantity, 8);
}

#[actix_web::test]
async fn duplicate_delivery_still_acks_but_changes_nothing() {
    let _ = env_logger::try_init().ok();
    let db = test_db("wh_duplicate").await;
    let order = seed_pending_order(&db, 2).await;
    let path = format!("/shop/payment_update?ref={}&pending=0&secret={WEBHOOK_SECRET}", order.order_ref.as_str());

    let (status, body) = get_request(None, &path, configure(db.clone())).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "OK"));
    let (status, body) = get_request(None, &path, configure(db.clone())).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "OK"));

    // One transition, one movement
    let level = db.fetch_level(SKU).await.unwrap().unwrap();
    assert_eq!(level.quantity, 8);
    assert_eq!(db.movements_for_sku(SKU).await.unwrap().len(), 1);
}

#[actix_web::test]
async fn non_final_notice_acks_without_processing() {
    let _ = env_logger::try_init().ok();
    let db = test_db("wh_nonfinal").await;
    let order = seed_pending_order(&db, 2).await;
    let path = format!("/shop/payment_update?ref={}&pending=1&secret={WEBHOOK_SECRET}", order.order_ref.as_str());
    let (status, body) = get_request(None, &path, configure(db.clone())).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "OK"));
    let stored = db.fetch_order_by_ref(&order.order_ref).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::Pending);
    assert_eq!(db.fetch_level(SKU).await.unwrap().unwrap().quantity, 10);
}

#[actix_web::test]
async fn unknown_reference_still_acks() {
    let _ = env_logger::try_init().ok();
    let db = test_db("wh_unknown").await;
    let path = format!("/shop/payment_update?ref=deadbeef00000000&pending=0&secret={WEBHOOK_SECRET}");
    let (status, body) = get_request(None, &path, configure(db)).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "OK"));
}
