//! Checkout intake tests: validation, pricing, the advisory stock check and the processor hand-off.

mod common;

use common::*;
use fulfillment_engine::{
    db_types::OrderStatusType,
    helpers::{DiscountSchedule, DiscountTier},
    order_objects::CheckoutRequest,
    traits::{CollaboratorError, OrderManagement, PaymentProcessor, PaymentQuote},
    CheckoutApi,
    CheckoutError,
    CheckoutSettings,
};
use sfg_common::{CoinAmount, Money};

fn checkout_request(quantity: u32) -> CheckoutRequest {
    CheckoutRequest {
        email: "Alice@Example.com".to_string(),
        address: test_address(),
        quantity,
        currency: "btc".to_string(),
    }
}

#[tokio::test]
async fn happy_path_creates_a_pending_order_and_customer() {
    let db = new_test_db("checkout_ok").await;
    let api = CheckoutApi::new(db.clone(), settings());
    let receipt = api.place_order(checkout_request(2), &StubProcessor::default()).await.unwrap();

    assert_eq!(receipt.fiat_total, Money::from(24));
    assert_eq!(receipt.payment_address, "bc1qstubaddress");
    assert_eq!(receipt.currency, "BTC");
    assert_eq!(receipt.order_number.len(), 5);

    let order = db.fetch_order_by_ref(&receipt.order_ref).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Pending);
    assert_eq!(order.email, "alice@example.com");
    assert_eq!(order.total_quantity(), 2);

    let customer = db.fetch_customer("alice@example.com").await.unwrap().unwrap();
    assert_eq!(customer.name, "Alice Tester");

    // Advisory check only: stock is untouched until settlement
    assert_eq!(stock_level(&db, SKU).await, 10);
}

#[tokio::test]
async fn volume_discount_tier_applies() {
    let db = new_test_db("checkout_tier").await;
    let settings = CheckoutSettings {
        schedule: DiscountSchedule::new(vec![DiscountTier { min_quantity: 5, percent_off: 15 }]),
        ..settings()
    };
    let api = CheckoutApi::new(db.clone(), settings);
    let receipt = api.place_order(checkout_request(5), &StubProcessor::default()).await.unwrap();
    // unit price round(12 * 0.85) = 10, total 50
    assert_eq!(receipt.fiat_total, Money::from(50));
}

#[tokio::test]
async fn validation_failures_reject_before_any_write() {
    let db = new_test_db("checkout_invalid").await;
    let api = CheckoutApi::new(db.clone(), settings());
    let processor = StubProcessor::default();

    let mut bad_email = checkout_request(1);
    bad_email.email = "not-an-email".to_string();
    let zero_quantity = checkout_request(0);
    let too_many = checkout_request(101);
    let mut short_address = checkout_request(1);
    short_address.address.line1 = "x".to_string();

    for request in [bad_email, zero_quantity, too_many, short_address] {
        let err = api.place_order(request, &processor).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)), "unexpected error: {err}");
    }
    assert!(db.search_orders(Default::default()).await.unwrap().is_empty());
    assert!(db.fetch_customer("alice@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn insufficient_stock_is_advisory_but_rejects_checkout() {
    let db = new_test_db("checkout_stock").await;
    let api = CheckoutApi::new(db.clone(), settings());
    let err = api.place_order(checkout_request(11), &StubProcessor::default()).await.unwrap_err();
    assert!(matches!(err, CheckoutError::InsufficientStock { available: 10, requested: 11 }), "unexpected: {err}");
}

#[tokio::test]
async fn below_processor_minimum_is_rejected() {
    let db = new_test_db("checkout_minimum").await;
    let api = CheckoutApi::new(db.clone(), settings());
    let processor = StubProcessor {
        quote: PaymentQuote {
            payment_address: "bc1qtiny".to_string(),
            crypto_amount: CoinAmount::from(5_000),
            minimum: CoinAmount::from(10_000),
        },
    };
    let err = api.place_order(checkout_request(1), &processor).await.unwrap_err();
    assert!(matches!(err, CheckoutError::BelowProcessorMinimum { .. }), "unexpected error: {err}");
    assert!(db.search_orders(Default::default()).await.unwrap().is_empty());
}

struct DownProcessor;

impl PaymentProcessor for DownProcessor {
    async fn request_payment(
        &self,
        _order_ref: &fulfillment_engine::db_types::OrderRef,
        _currency: &str,
        _fiat_total: Money,
    ) -> Result<PaymentQuote, CollaboratorError> {
        Err(CollaboratorError::Unreachable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn processor_outage_surfaces_without_creating_an_order() {
    let db = new_test_db("checkout_outage").await;
    let api = CheckoutApi::new(db.clone(), settings());
    let err = api.place_order(checkout_request(1), &DownProcessor).await.unwrap_err();
    assert!(matches!(err, CheckoutError::ProcessorUnavailable(_)), "unexpected error: {err}");
    assert!(db.search_orders(Default::default()).await.unwrap().is_empty());
}
