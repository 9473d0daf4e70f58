use fulfillment_engine::events::{LowStockEvent, OrderPaidEvent, OrderRefundedEvent, OrderShippedEvent};
use log::*;
use serde_json::json;

use crate::config::NotifierConfig;

/// Best-effort fan-out to the email/SMS relay. Every method swallows its own failures after logging them: a slow
/// or dead relay must never block or fail the order transition that triggered the notification.
#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    config: NotifierConfig,
}

impl Notifier {
    pub fn new(config: NotifierConfig) -> Self {
        Self { client: reqwest::Client::new(), config }
    }

    pub async fn order_paid(&self, event: &OrderPaidEvent) {
        let order = &event.order;
        // One admin notice, one customer confirmation
        self.send(
            "admin.order_paid",
            json!({
                "to": self.config.admin_contact,
                "order_number": order.order_number,
                "total": order.fiat_total,
                "quantity": order.total_quantity(),
            }),
        )
        .await;
        self.send(
            "customer.order_confirmation",
            json!({
                "to": order.email,
                "order_number": order.order_number,
                "status_ref": order.order_ref.as_str(),
            }),
        )
        .await;
    }

    pub async fn order_shipped(&self, event: &OrderShippedEvent) {
        let order = &event.order;
        self.send(
            "customer.shipment",
            json!({
                "to": order.email,
                "order_number": order.order_number,
                "carrier": order.carrier,
                "tracking_number": order.tracking_number,
            }),
        )
        .await;
    }

    pub async fn order_refunded(&self, event: &OrderRefundedEvent) {
        self.send(
            "customer.refund",
            json!({
                "to": event.order.email,
                "order_number": event.order.order_number,
                "amount": event.amount,
                "full": event.full,
            }),
        )
        .await;
    }

    pub async fn low_stock(&self, event: &LowStockEvent) {
        self.send(
            "admin.low_stock",
            json!({
                "to": self.config.admin_contact,
                "sku": event.sku,
                "quantity": event.quantity,
                "threshold": event.threshold,
            }),
        )
        .await;
    }

    async fn send(&self, kind: &str, payload: serde_json::Value) {
        let Some(relay_url) = self.config.relay_url.as_deref() else {
            info!("📣️ [{kind}] (relay not configured, logging only) {payload}");
            return;
        };
        let body = json!({ "kind": kind, "payload": payload });
        match self.client.post(relay_url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("📣️ [{kind}] notification relayed");
            },
            Ok(response) => {
                warn!("📣️ [{kind}] notification relay answered {}. Dropping the notification.", response.status());
            },
            Err(e) => {
                warn!("📣️ [{kind}] notification relay unreachable: {e}. Dropping the notification.");
            },
        }
    }
}
