use serde::{Deserialize, Serialize};
use sfg_common::Money;

use crate::db_types::{Order, OrderStatusType};

/// Published after an order transitions to `Paid`, whether via webhook settlement or a staff manual order.
/// Subscribers send the admin and customer confirmations.
#[derive(Debug, Clone)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Published after an order transitions to `Shipped`. Subscribers register the shipment with the carrier tracker
/// and notify the customer.
#[derive(Debug, Clone)]
pub struct OrderShippedEvent {
    pub order: Order,
}

/// Published after a full or partial refund has been recorded.
#[derive(Debug, Clone)]
pub struct OrderRefundedEvent {
    pub order: Order,
    pub amount: Money,
    pub full: bool,
}

/// Published when an order is taken out of play without being fulfilled (cancelled or expired).
#[derive(Debug, Clone)]
pub struct OrderAnnulledEvent {
    pub order: Order,
    pub status: OrderStatusType,
}

impl OrderAnnulledEvent {
    pub fn new(order: Order) -> Self {
        let status = order.status;
        Self { order, status }
    }
}

/// Published when a successful inventory adjustment leaves the quantity below the configured threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockEvent {
    pub sku: String,
    pub quantity: i64,
    pub threshold: i64,
}
