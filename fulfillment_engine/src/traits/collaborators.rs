use serde::{Deserialize, Serialize};
use sfg_common::{CoinAmount, Money};
use thiserror::Error;

use crate::db_types::{OrderRef, TrackingEvent};

/// The external payment processor: issues a payment address for an order and quotes the crypto amount at the
/// current exchange rate. Settlement itself arrives later, asynchronously, over the webhook.
#[allow(async_fn_in_trait)]
pub trait PaymentProcessor {
    async fn request_payment(
        &self,
        order_ref: &OrderRef,
        currency: &str,
        fiat_total: Money,
    ) -> Result<PaymentQuote, CollaboratorError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentQuote {
    pub payment_address: String,
    pub crypto_amount: CoinAmount,
    /// The processor's minimum transaction size for this currency. Orders quoting below this are rejected at
    /// checkout rather than left to fail on-chain.
    pub minimum: CoinAmount,
}

/// The external delivery-carrier tracking service, polled by the delivery sweeper for `Shipped` orders.
#[allow(async_fn_in_trait)]
pub trait DeliveryTracker {
    async fn track(&self, carrier: &str, tracking_number: &str) -> Result<TrackingSnapshot, CollaboratorError>;

    /// Registers a shipment for tracking. Best-effort; failures are logged by the caller and never block the
    /// shipping transition.
    async fn register(&self, carrier: &str, tracking_number: &str) -> Result<(), CollaboratorError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSnapshot {
    pub status: String,
    pub delivered: bool,
    pub events: Vec<TrackingEvent>,
}

#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    #[error("The service could not be reached: {0}")]
    Unreachable(String),
    #[error("The service rejected the request: {0}")]
    Rejected(String),
}
