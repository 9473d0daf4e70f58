use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sfg_common::{CoinAmount, Money};

use crate::db_types::{OrderRef, OrderStatusType, ShippingAddress};

//--------------------------------------   OrderQueryFilter    -------------------------------------------------------
/// Search criteria for the staff order-search endpoint. Empty fields are not constrained.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderQueryFilter {
    pub order_ref: Option<OrderRef>,
    pub order_number: Option<String>,
    pub email: Option<String>,
    pub status: Option<OrderStatusType>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl OrderQueryFilter {
    pub fn is_empty(&self) -> bool {
        self.order_ref.is_none()
            && self.order_number.is_none()
            && self.email.is_none()
            && self.status.is_none()
            && self.since.is_none()
            && self.until.is_none()
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_email<S: Into<String>>(mut self, email: S) -> Self {
        self.email = Some(email.into());
        self
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(r) = &self.order_ref {
            parts.push(format!("ref={r}"));
        }
        if let Some(n) = &self.order_number {
            parts.push(format!("number={n}"));
        }
        if let Some(e) = &self.email {
            parts.push(format!("email={e}"));
        }
        if let Some(s) = &self.status {
            parts.push(format!("status={s}"));
        }
        if let Some(s) = &self.since {
            parts.push(format!("since={s}"));
        }
        if let Some(u) = &self.until {
            parts.push(format!("until={u}"));
        }
        write!(f, "{}", parts.join(", "))
    }
}

//--------------------------------------   CheckoutRequest     -------------------------------------------------------
/// The storefront purchase request. Validation happens in the checkout API, not at deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub email: String,
    pub address: ShippingAddress,
    pub quantity: u32,
    /// The crypto currency the customer wants to pay with, e.g. "BTC".
    pub currency: String,
}

//--------------------------------------   CheckoutReceipt     -------------------------------------------------------
/// What the customer gets back from a successful checkout: enough to pay and to poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutReceipt {
    pub order_ref: OrderRef,
    pub order_number: String,
    pub payment_address: String,
    pub crypto_amount: CoinAmount,
    pub currency: String,
    pub fiat_total: Money,
}

//--------------------------------------   ShipmentRequest     -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentRequest {
    pub carrier: String,
    pub tracking_number: String,
    #[serde(default)]
    pub shipping_cost: Option<Money>,
}

//--------------------------------------  ManualOrderRequest   -------------------------------------------------------
/// Staff-initiated order creation that bypasses payment (offline and alternative-payment sales).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualOrderRequest {
    pub email: String,
    pub address: ShippingAddress,
    pub quantity: u32,
    #[serde(default)]
    pub reason: Option<String>,
}

//-------------------------------------- DeliverySweepReport   -------------------------------------------------------
/// Outcome of one delivery-poller sweep. Per-order failures are isolated and collected here rather than aborting
/// the sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliverySweepReport {
    pub checked: usize,
    pub delivered: Vec<OrderRef>,
    pub errors: Vec<SweepError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepError {
    pub order_ref: OrderRef,
    pub error: String,
}
