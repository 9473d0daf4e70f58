use std::fmt::Display;

use fulfillment_engine::db_types::{OrderStatusType, StockAdjustment};
use serde::{Deserialize, Serialize};
use sfg_common::Money;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// Query parameters of the payment processor's settlement webhook. `pending=0` means the payment is no longer
/// pending, i.e. it settled; any other value is an informational notice that needs no processing.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentUpdateParams {
    #[serde(rename = "ref")]
    pub order_ref: String,
    pub pending: Option<String>,
    pub amount: Option<String>,
    pub secret: Option<String>,
}

/// Body of the staff status-update endpoint. Shipping details are required when `new_status` is `Shipped` and
/// ignored otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusParams {
    pub new_status: OrderStatusType,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub shipping_cost: Option<Money>,
}

/// Body of the staff refund endpoint. A missing amount means a full refund.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefundParams {
    #[serde(default)]
    pub amount: Option<Money>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustStockParams {
    #[serde(flatten)]
    pub adjustment: StockAdjustment,
    pub reason: String,
}

/// The customer status poll response. Deliberately nothing but the status string: the endpoint is unauthenticated,
/// so no amounts, addresses or contact details may leak through it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerProfileResponse {
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub lifetime_spend: Money,
}
