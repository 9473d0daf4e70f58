use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;
use sfg_common::{CoinAmount, Money};
use thiserror::Error;

use crate::{
    db_types::{
        LineItem,
        NewOrder,
        Order,
        OrderRef,
        OrderStatusType,
        SettlementOutcome,
        StockAdjustment,
    },
    events::{EventProducers, OrderAnnulledEvent, OrderPaidEvent, OrderRefundedEvent, OrderShippedEvent},
    ffe_api::{CheckoutSettings, InventoryApi},
    helpers::{is_valid_email, normalize_email},
    order_objects::{DeliverySweepReport, ManualOrderRequest, ShipmentRequest, SweepError},
    status::{classify_refund, verify_transition, TransitionError},
    traits::{DeliveryTracker, FulfillmentDatabase, FulfillmentDbError, InventoryError, OrderManagement},
};

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderRef),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Transition(#[from] TransitionError),
    #[error("{0}")]
    Database(#[from] FulfillmentDbError),
    #[error("{0}")]
    Inventory(#[from] InventoryError),
}

/// `OrderFlowApi` drives every order transition after checkout: webhook settlement, the staff ship / refund /
/// cancel / manual-order actions, and the two sweeps.
///
/// Each flow is the same shape: verify the edge against the state graph, perform the conditional status write,
/// and only then orchestrate the side effects (inventory movement, audit note, event publication). Side effects
/// that fail after the status write never revert it; they are logged and reconciled out-of-band.
pub struct OrderFlowApi<B> {
    db: B,
    inventory: InventoryApi<B>,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B: Clone> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers, low_stock_threshold: i64) -> Self {
        let inventory = InventoryApi::new(db.clone(), producers.clone(), low_stock_threshold);
        Self { db, inventory, producers }
    }

    pub fn inventory(&self) -> &InventoryApi<B> {
        &self.inventory
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> OrderFlowApi<B>
where B: FulfillmentDatabase
{
    /// Processes a settlement notification from the payment processor.
    ///
    /// The processor delivers at least once, so this is written to be replay-safe: if the order has already
    /// settled, the call is recognised as a duplicate and returns without touching anything. A genuine first
    /// settlement moves the order `Pending -> Paid` (recording the settled amount when reported), then makes
    /// exactly one `Sale` ledger adjustment for the summed item quantities, then notifies subscribers.
    ///
    /// The payment is the source of truth: once the status write lands, an inventory conflict or notification
    /// failure is logged and the order stays `Paid`.
    pub async fn settle_order(
        &self,
        order_ref: &OrderRef,
        settled_amount: Option<CoinAmount>,
    ) -> Result<SettlementOutcome, OrderFlowError> {
        let order =
            self.db.fetch_order_by_ref(order_ref).await?.ok_or_else(|| OrderFlowError::OrderNotFound(order_ref.clone()))?;
        if order.status.is_settled() {
            info!("💸️ Duplicate settlement notice for {order_ref} (already {}). Ignoring.", order.status);
            return Ok(SettlementOutcome::Duplicate(order));
        }
        verify_transition(order.status, OrderStatusType::Paid)?;
        let updated = match self
            .db
            .update_order_status(order_ref, OrderStatusType::Pending, OrderStatusType::Paid)
            .await
        {
            Ok(order) => order,
            Err(FulfillmentDbError::StaleStatus { actual, .. }) if actual.is_settled() => {
                // A concurrent duplicate delivery won the race and did the work.
                info!("💸️ Settlement race for {order_ref}: another delivery settled it first. Ignoring.");
                let order = self
                    .db
                    .fetch_order_by_ref(order_ref)
                    .await?
                    .ok_or_else(|| OrderFlowError::OrderNotFound(order_ref.clone()))?;
                return Ok(SettlementOutcome::Duplicate(order));
            },
            Err(e) => return Err(e.into()),
        };
        info!("💸️ Order {order_ref} settled and marked as paid");
        if settled_amount.is_some() {
            if let Err(e) = self.db.record_settlement(order_ref, settled_amount).await {
                warn!("💸️ Could not record the settled amount for {order_ref}. The order remains paid. {e}");
            }
        }
        self.deduct_stock_for(&updated, "order settled", "system/webhook").await;
        self.call_order_paid_hook(&updated).await;
        Ok(SettlementOutcome::Settled(updated))
    }

    /// Moves a `Paid` order into `Processing`.
    pub async fn mark_processing(&self, order_ref: &OrderRef) -> Result<Order, OrderFlowError> {
        let order = self.fetch(order_ref).await?;
        verify_transition(order.status, OrderStatusType::Processing)?;
        let updated = self.db.update_order_status(order_ref, order.status, OrderStatusType::Processing).await?;
        debug!("🔄️ Order {order_ref} is now being processed");
        Ok(updated)
    }

    /// Ships an order. Requires a carrier and a tracking number; a `Paid` order passes through `Processing` on its
    /// way out, since the state graph has no direct `Paid -> Shipped` edge.
    pub async fn ship_order(&self, order_ref: &OrderRef, request: &ShipmentRequest) -> Result<Order, OrderFlowError> {
        if request.carrier.trim().is_empty() || request.tracking_number.trim().is_empty() {
            return Err(TransitionError::MissingShipmentDetails.into());
        }
        let order = self.fetch(order_ref).await?;
        let mut current = order.status;
        if current == OrderStatusType::Paid {
            verify_transition(current, OrderStatusType::Processing)?;
            self.db.update_order_status(order_ref, current, OrderStatusType::Processing).await?;
            current = OrderStatusType::Processing;
        }
        verify_transition(current, OrderStatusType::Shipped)?;
        let updated = self
            .db
            .mark_order_shipped(order_ref, current, &request.carrier, &request.tracking_number, request.shipping_cost)
            .await?;
        info!("🔄️ Order {order_ref} shipped via {} ({})", request.carrier, request.tracking_number);
        self.call_order_shipped_hook(&updated).await;
        Ok(updated)
    }

    /// Marks a `Shipped` order as `Delivered`. Used by staff; the delivery poller takes the same edge.
    pub async fn mark_delivered(&self, order_ref: &OrderRef) -> Result<Order, OrderFlowError> {
        let order = self.fetch(order_ref).await?;
        verify_transition(order.status, OrderStatusType::Delivered)?;
        let updated = self.db.update_order_status(order_ref, order.status, OrderStatusType::Delivered).await?;
        info!("🔄️ Order {order_ref} delivered");
        Ok(updated)
    }

    /// Refunds an order, fully (the default) or partially. The refund amount decides the terminal status; stock
    /// is restored by the order's total item quantity and the action is recorded in the order's notes.
    pub async fn refund_order(
        &self,
        order_ref: &OrderRef,
        amount: Option<Money>,
        reason: Option<&str>,
        actor: &str,
    ) -> Result<Order, OrderFlowError> {
        let order = self.fetch(order_ref).await?;
        let requested = amount.unwrap_or(order.fiat_total);
        let target = classify_refund(requested, order.fiat_total)?;
        verify_transition(order.status, target)?;
        let updated = self.db.update_order_status(order_ref, order.status, target).await?;
        info!("🔄️ Order {order_ref} refunded {requested} by {actor} ({target})");
        let note = format!(
            "[{}] Refund of {requested} issued by {actor}: {}\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
            reason.unwrap_or("no reason given")
        );
        if let Err(e) = self.db.append_note(order_ref, &note).await {
            warn!("🔄️ Could not record the refund note for {order_ref}. The refund stands. {e}");
        }
        self.restore_stock_for(&updated, StockAdjustment::Refund(updated.total_quantity()), "order refunded", actor)
            .await;
        let event =
            OrderRefundedEvent { order: updated.clone(), amount: requested, full: target == OrderStatusType::Refunded };
        for emitter in &self.producers.order_refunded_producer {
            emitter.publish_event(event.clone()).await;
        }
        Ok(updated)
    }

    /// Cancels an order. Stock is restored only when the order had already settled (i.e. its stock was actually
    /// decremented); cancelling a `Pending` order leaves inventory untouched because nothing was ever taken.
    pub async fn cancel_order(&self, order_ref: &OrderRef, actor: &str) -> Result<Order, OrderFlowError> {
        let order = self.fetch(order_ref).await?;
        verify_transition(order.status, OrderStatusType::Cancelled)?;
        let had_stock = order.status.is_settled();
        let updated = self.db.update_order_status(order_ref, order.status, OrderStatusType::Cancelled).await?;
        info!("🔄️ Order {order_ref} cancelled by {actor} (was {})", order.status);
        if had_stock {
            self.restore_stock_for(&updated, StockAdjustment::Add(updated.total_quantity()), "order cancelled", actor)
                .await;
        }
        let note = format!("[{}] Cancelled by {actor}\n", Utc::now().format("%Y-%m-%d %H:%M:%S"));
        if let Err(e) = self.db.append_note(order_ref, &note).await {
            warn!("🔄️ Could not record the cancellation note for {order_ref}. {e}");
        }
        self.call_order_annulled_hook(&updated).await;
        Ok(updated)
    }

    /// Creates a staff order that bypasses payment entirely: born `Paid`, stock deducted inline, warehouse
    /// notified through the usual order-paid hook. Used for offline and alternative-payment sales.
    pub async fn create_manual_order(
        &self,
        request: &ManualOrderRequest,
        staff: &str,
        settings: &CheckoutSettings,
    ) -> Result<Order, OrderFlowError> {
        if !is_valid_email(&request.email) {
            return Err(OrderFlowError::InvalidRequest("A valid email address is required".to_string()));
        }
        if request.quantity < 1 || request.quantity > settings.max_quantity {
            return Err(OrderFlowError::InvalidRequest(format!(
                "Quantity must be between 1 and {}",
                settings.max_quantity
            )));
        }
        let unit_price = settings.schedule.unit_price(settings.base_price, request.quantity);
        let items = vec![LineItem::new(&settings.sku, request.quantity, unit_price)];
        let fiat_total = unit_price * i64::from(request.quantity);
        let mut order =
            NewOrder::new(normalize_email(&request.email), request.address.clone(), items, fiat_total);
        order.status = OrderStatusType::Paid;
        order.placed_by = Some(staff.to_string());
        order.currency = "MANUAL".to_string();
        let stored = self.db.insert_order(order).await?;
        self.db.upsert_customer(&stored.email, &request.address.name, request.address.phone.as_deref()).await?;
        info!("🔄️ Manual order {} ({}) placed by {staff}", stored.order_ref, stored.order_number);
        if let Some(reason) = &request.reason {
            let note = format!("[{}] Manual order by {staff}: {reason}\n", Utc::now().format("%Y-%m-%d %H:%M:%S"));
            if let Err(e) = self.db.append_note(&stored.order_ref, &note).await {
                warn!("🔄️ Could not record the manual-order note for {}. {e}", stored.order_ref);
            }
        }
        self.deduct_stock_for(&stored, "manual order", staff).await;
        self.call_order_paid_hook(&stored).await;
        Ok(stored)
    }

    /// Sweeps stale `Pending` orders to `Expired`. Stock was never decremented for pending orders, so there is no
    /// inventory effect. Returns the orders that were expired.
    pub async fn expire_old_orders(&self, older_than: Duration) -> Result<Vec<Order>, OrderFlowError> {
        let expired = self.db.expire_pending_orders(older_than).await?;
        info!("🕰️ {} pending orders expired", expired.len());
        for order in &expired {
            self.call_order_annulled_hook(order).await;
        }
        Ok(expired)
    }

    /// Polls the carrier tracker for every `Shipped` order with a tracking number, persists the latest snapshot
    /// and advances delivered orders. One order's tracking failure never aborts the sweep for the rest; failures
    /// are collected into the report.
    pub async fn poll_deliveries<T: DeliveryTracker>(
        &self,
        tracker: &T,
    ) -> Result<DeliverySweepReport, OrderFlowError> {
        let shipped = self.db.fetch_orders_in_status(OrderStatusType::Shipped).await?;
        let mut report = DeliverySweepReport::default();
        for order in shipped {
            let (Some(carrier), Some(tracking_number)) = (order.carrier.as_deref(), order.tracking_number.as_deref())
            else {
                continue;
            };
            report.checked += 1;
            let snapshot = match tracker.track(carrier, tracking_number).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("🕰️ Tracking lookup failed for {}: {e}", order.order_ref);
                    report.errors.push(SweepError { order_ref: order.order_ref.clone(), error: e.to_string() });
                    continue;
                },
            };
            if let Err(e) = self.db.update_tracking(&order.order_ref, &snapshot.status, &snapshot.events).await {
                report.errors.push(SweepError { order_ref: order.order_ref.clone(), error: e.to_string() });
                continue;
            }
            if snapshot.delivered {
                match self
                    .db
                    .update_order_status(&order.order_ref, OrderStatusType::Shipped, OrderStatusType::Delivered)
                    .await
                {
                    Ok(_) => {
                        info!("🕰️ Order {} delivered (carrier: {})", order.order_ref, snapshot.status);
                        report.delivered.push(order.order_ref.clone());
                    },
                    Err(FulfillmentDbError::StaleStatus { actual, .. }) => {
                        debug!("🕰️ Order {} moved to {actual} mid-sweep; leaving it be", order.order_ref);
                    },
                    Err(e) => {
                        report.errors.push(SweepError { order_ref: order.order_ref.clone(), error: e.to_string() });
                    },
                }
            }
        }
        info!("🕰️ Delivery sweep complete: {} checked, {} delivered, {} errors", report.checked, report.delivered.len(), report.errors.len());
        Ok(report)
    }

    async fn fetch(&self, order_ref: &OrderRef) -> Result<Order, OrderFlowError> {
        self.db.fetch_order_by_ref(order_ref).await?.ok_or_else(|| OrderFlowError::OrderNotFound(order_ref.clone()))
    }

    /// One `Sale` adjustment for the summed item quantities. A conflict here is logged and swallowed: the payment
    /// (or staff decision) that triggered it has already been durably recorded, and rolling that back over a stock
    /// bookkeeping race would be far worse than reconciling the ledger by hand.
    async fn deduct_stock_for(&self, order: &Order, reason: &str, actor: &str) {
        let Some(sku) = order.items.first().map(|i| i.sku.clone()) else {
            return;
        };
        let quantity = order.total_quantity();
        match self
            .inventory
            .adjust(&sku, StockAdjustment::Sale(quantity), reason, actor, Some(&order.order_ref))
            .await
        {
            Ok(new_quantity) => debug!("🔄️ Stock for {sku} decremented by {quantity}, now {new_quantity}"),
            Err(e) => {
                warn!("🔄️ Could not decrement stock for order {}. The order stays {}; reconcile the ledger manually. {e}", order.order_ref, order.status)
            },
        }
    }

    async fn restore_stock_for(&self, order: &Order, adjustment: StockAdjustment, reason: &str, actor: &str) {
        let Some(sku) = order.items.first().map(|i| i.sku.clone()) else {
            return;
        };
        match self.inventory.adjust(&sku, adjustment, reason, actor, Some(&order.order_ref)).await {
            Ok(new_quantity) => debug!("🔄️ Stock for {sku} restored, now {new_quantity}"),
            Err(e) => {
                warn!("🔄️ Could not restore stock for order {}. Reconcile the ledger manually. {e}", order.order_ref)
            },
        }
    }

    async fn call_order_paid_hook(&self, order: &Order) {
        for emitter in &self.producers.order_paid_producer {
            trace!("🔄️ Notifying order-paid hook subscribers");
            emitter.publish_event(OrderPaidEvent::new(order.clone())).await;
        }
    }

    async fn call_order_shipped_hook(&self, order: &Order) {
        for emitter in &self.producers.order_shipped_producer {
            trace!("🔄️ Notifying order-shipped hook subscribers");
            emitter.publish_event(OrderShippedEvent { order: order.clone() }).await;
        }
    }

    async fn call_order_annulled_hook(&self, order: &Order) {
        for emitter in &self.producers.order_annulled_producer {
            trace!("🔄️ Notifying order-annulled hook subscribers");
            emitter.publish_event(OrderAnnulledEvent::new(order.clone())).await;
        }
    }
}
