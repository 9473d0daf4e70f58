use actix_web::{
    dev::ServiceResponse,
    http::StatusCode,
    test,
    web,
    web::ServiceConfig,
    App,
};
use chrono::Duration;
use fulfillment_engine::{
    db_types::{LineItem, NewOrder, Order, OrderRef, Role, ShippingAddress},
    events::EventProducers,
    test_utils::prepare_env::prepare_test_env,
    traits::{FulfillmentDatabase, InventoryStore},
    CheckoutApi,
    CheckoutSettings,
    OrderFlowApi,
    SqliteDatabase,
};
use sfg_common::{CoinAmount, Money, Secret};

use crate::{
    auth::{ApiKeyRegistry, API_KEY_HEADER},
    config::{CronOptions, ServerOptions, WebhookOptions},
    rate_limit::SlidingWindowLimiter,
};

pub const SKU: &str = "SFG-001";
pub const WEBHOOK_SECRET: &str = "hook-secret-for-tests";
pub const CRON_SECRET: &str = "cron-secret-for-tests";
pub const WRITE_KEY: &str = "carol-test-key-0123";
pub const READ_KEY: &str = "dash-test-key-4567";

pub async fn test_db(name: &str) -> SqliteDatabase {
    let url = format!("sqlite://../data/test_server_{name}_{}.db", rand::random::<u32>());
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 10).await.expect("Error creating database");
    db.provision_sku(SKU, 10).await.expect("Error provisioning SKU");
    db
}

pub fn test_registry() -> ApiKeyRegistry {
    ApiKeyRegistry::default()
        .with_key("carol", WRITE_KEY, vec![Role::ReadAll, Role::Write])
        .with_key("dash", READ_KEY, vec![Role::ReadAll])
}

/// Registers the app data every route expects: APIs, key registry, options and a permissive rate limiter.
/// Individual tests layer their routes (and any overrides) on top.
pub fn base_app_data(db: &SqliteDatabase, cfg: &mut ServiceConfig) {
    let orders_api = OrderFlowApi::new(db.clone(), EventProducers::default(), 3);
    let checkout_api = CheckoutApi::new(db.clone(), CheckoutSettings::default());
    cfg.app_data(web::Data::new(orders_api))
        .app_data(web::Data::new(checkout_api))
        .app_data(web::Data::new(CheckoutSettings::default()))
        .app_data(web::Data::new(test_registry()))
        .app_data(web::Data::new(ServerOptions { use_x_forwarded_for: false, use_forwarded: false }))
        .app_data(web::Data::new(SlidingWindowLimiter::new(1000, std::time::Duration::from_secs(60))))
        .app_data(web::Data::new(WebhookOptions { secret: Some(Secret::new(WEBHOOK_SECRET.to_string())) }))
        .app_data(web::Data::new(CronOptions {
            secret: Some(Secret::new(CRON_SECRET.to_string())),
            order_expiry: Duration::hours(24),
        }));
}

pub async fn seed_pending_order(db: &SqliteDatabase, quantity: u32) -> Order {
    let unit_price = Money::from(12);
    let items = vec![LineItem::new(SKU, quantity, unit_price)];
    let total = unit_price * i64::from(quantity);
    let mut order = NewOrder::new("alice@example.com".to_string(), test_address(), items, total);
    order.currency = "BTC".to_string();
    order.crypto_amount = CoinAmount::from(500_000);
    order.payment_address = Some("bc1qtestaddress".to_string());
    db.insert_order(order).await.expect("Error inserting order")
}

pub fn test_address() -> ShippingAddress {
    ShippingAddress {
        name: "Alice Tester".to_string(),
        line1: "12 Long Street".to_string(),
        line2: None,
        city: "Cape Town".to_string(),
        postcode: "8001".to_string(),
        country: "ZA".to_string(),
        phone: Some("+27215550100".to_string()),
    }
}

pub async fn age_order(db: &SqliteDatabase, order_ref: &OrderRef, hours: i64) {
    sqlx::query(&format!("UPDATE orders SET created_at = datetime('now', '-{hours} hours') WHERE order_ref = $1"))
        .bind(order_ref.as_str())
        .execute(db.pool())
        .await
        .expect("Error aging order");
}

pub async fn get_request<F>(api_key: Option<&str>, path: &str, configure: F) -> (StatusCode, String)
where F: FnOnce(&mut ServiceConfig) {
    let app = test::init_service(App::new().configure(configure)).await;
    let mut req = test::TestRequest::get().uri(path);
    if let Some(key) = api_key {
        req = req.insert_header((API_KEY_HEADER, key));
    }
    let response = test::call_service(&app, req.to_request()).await;
    into_parts(response).await
}

pub async fn post_request<F>(
    api_key: Option<&str>,
    path: &str,
    body: serde_json::Value,
    configure: F,
) -> (StatusCode, String)
where
    F: FnOnce(&mut ServiceConfig),
{
    let app = test::init_service(App::new().configure(configure)).await;
    let mut req = test::TestRequest::post().uri(path).set_json(body);
    if let Some(key) = api_key {
        req = req.insert_header((API_KEY_HEADER, key));
    }
    let response = test::call_service(&app, req.to_request()).await;
    into_parts(response).await
}

pub async fn into_parts(response: ServiceResponse) -> (StatusCode, String) {
    let status = response.status();
    let body = test::read_body(response).await;
    (status, String::from_utf8_lossy(&body).to_string())
}
