//! Shared fixtures for the engine integration tests.
#![allow(dead_code)]

use fulfillment_engine::{
    db_types::{LineItem, NewOrder, Order, OrderRef, OrderStatusType, ShippingAddress},
    events::EventProducers,
    test_utils::prepare_env::prepare_test_env,
    traits::{
        CollaboratorError,
        DeliveryTracker,
        FulfillmentDatabase,
        InventoryStore,
        PaymentProcessor,
        PaymentQuote,
        TrackingSnapshot,
    },
    CheckoutSettings,
    OrderFlowApi,
    SqliteDatabase,
};
use sfg_common::{CoinAmount, Money};

pub const SKU: &str = "SFG-001";

pub async fn new_test_db(name: &str) -> SqliteDatabase {
    let url = format!("sqlite://../data/test_{name}_{}.db", rand::random::<u32>());
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 10).await.expect("Error creating database");
    db.provision_sku(SKU, 10).await.expect("Error provisioning SKU");
    db
}

pub fn flow_api(db: &SqliteDatabase) -> OrderFlowApi<SqliteDatabase> {
    OrderFlowApi::new(db.clone(), EventProducers::default(), 3)
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

/// Inserts a pending order for `quantity` units at `unit_price`, bypassing checkout.
pub async fn pending_order(db: &SqliteDatabase, quantity: u32, unit_price: i64) -> Order {
    let unit_price = Money::from(unit_price);
    let items = vec![LineItem::new(SKU, quantity, unit_price)];
    let total = unit_price * i64::from(quantity);
    let mut order = NewOrder::new("alice@example.com".to_string(), test_address(), items, total);
    order.currency = "BTC".to_string();
    order.crypto_amount = CoinAmount::from(500_000);
    order.payment_address = Some("bc1qtestaddress".to_string());
    db.insert_order(order).await.expect("Error inserting order")
}

/// Ages an order's creation timestamp by the given number of hours, for expiry tests.
pub async fn age_order(db: &SqliteDatabase, order_ref: &OrderRef, hours: i64) {
    sqlx::query(&format!("UPDATE orders SET created_at = datetime('now', '-{hours} hours') WHERE order_ref = $1"))
        .bind(order_ref.as_str())
        .execute(db.pool())
        .await
        .expect("Error aging order");
}

pub async fn stock_level(db: &SqliteDatabase, sku: &str) -> i64 {
    db.fetch_level(sku).await.expect("Error fetching level").expect("SKU missing").quantity
}

#[derive(Clone)]
pub struct StubProcessor {
    pub quote: PaymentQuote,
}

impl Default for StubProcessor {
    fn default() -> Self {
        Self {
            quote: PaymentQuote {
                payment_address: "bc1qstubaddress".to_string(),
                crypto_amount: CoinAmount::from(500_000),
                minimum: CoinAmount::from(10_000),
            },
        }
    }
}

impl PaymentProcessor for StubProcessor {
    async fn request_payment(
        &self,
        _order_ref: &fulfillment_engine::db_types::OrderRef,
        _currency: &str,
        _fiat_total: Money,
    ) -> Result<PaymentQuote, CollaboratorError> {
        Ok(self.quote.clone())
    }
}

/// A tracker that reports every shipment with the given status.
#[derive(Clone)]
pub struct StubTracker {
    pub status: String,
    pub delivered: bool,
    pub fail_for: Option<String>,
}

impl StubTracker {
    pub fn delivered() -> Self {
        Self { status: "Delivered".to_string(), delivered: true, fail_for: None }
    }

    pub fn in_transit() -> Self {
        Self { status: "InTransit".to_string(), delivered: false, fail_for: None }
    }
}

impl DeliveryTracker for StubTracker {
    async fn track(&self, _carrier: &str, tracking_number: &str) -> Result<TrackingSnapshot, CollaboratorError> {
        if self.fail_for.as_deref() == Some(tracking_number) {
            return Err(CollaboratorError::Unreachable("tracking service timed out".to_string()));
        }
        Ok(TrackingSnapshot { status: self.status.clone(), delivered: self.delivered, events: Vec::new() })
    }

    async fn register(&self, _carrier: &str, _tracking_number: &str) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

pub fn settings() -> CheckoutSettings {
    CheckoutSettings::default()
}

pub fn assert_status(order: &Order, status: OrderStatusType) {
    assert_eq!(order.status, status, "expected {status}, got {}", order.status);
}
