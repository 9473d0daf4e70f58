use chrono::Duration;
use sfg_common::CoinAmount;
use thiserror::Error;

use crate::{
    db_types::{Customer, NewOrder, Order, OrderRef, OrderStatusType, TrackingEvent},
    status::TransitionError,
    traits::{InventoryStore, OrderManagement},
};

/// Write-side behaviour for backends supporting the fulfillment engine. A backend that fulfills orders also keeps
/// the stock they move, so the inventory store rides along as a supertrait.
///
/// The order's status column is the serialization point for order-level races: every status write here is
/// conditional on the status the caller previously observed, and a lost race surfaces as
/// [`FulfillmentDbError::StaleStatus`] rather than a silent overwrite.
#[allow(async_fn_in_trait)]
pub trait FulfillmentDatabase: Clone + OrderManagement + InventoryStore {
    /// The URL of the database.
    fn url(&self) -> &str;

    /// Persists a new order, generating a fresh order reference and a collision-checked order number. Upserts
    /// nothing else; customer bookkeeping is a separate call.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, FulfillmentDbError>;

    /// Conditionally moves an order from `expected` to `new_status`. The write only succeeds if the stored status
    /// still equals `expected`; otherwise the current row is fetched and returned inside
    /// [`FulfillmentDbError::StaleStatus`].
    ///
    /// Legality of the edge is the caller's job (via [`crate::status::verify_transition`]); this method only
    /// guarantees atomicity of the check-and-set.
    async fn update_order_status(
        &self,
        order_ref: &OrderRef,
        expected: OrderStatusType,
        new_status: OrderStatusType,
    ) -> Result<Order, FulfillmentDbError>;

    /// Records the amount the processor reported at settlement.
    async fn record_settlement(
        &self,
        order_ref: &OrderRef,
        amount: Option<CoinAmount>,
    ) -> Result<(), FulfillmentDbError>;

    /// Conditionally moves an order into `Shipped`, recording carrier, tracking number, optional shipping cost and
    /// the shipped timestamp in the same write.
    async fn mark_order_shipped(
        &self,
        order_ref: &OrderRef,
        expected: OrderStatusType,
        carrier: &str,
        tracking_number: &str,
        shipping_cost: Option<sfg_common::Money>,
    ) -> Result<Order, FulfillmentDbError>;

    /// Appends a line to the order's administrative notes. Allowed in any status, including terminal ones.
    async fn append_note(&self, order_ref: &OrderRef, note: &str) -> Result<(), FulfillmentDbError>;

    /// Replaces the order's tracking snapshot and event history. Allowed in any status, including terminal ones.
    async fn update_tracking(
        &self,
        order_ref: &OrderRef,
        status: &str,
        events: &[TrackingEvent],
    ) -> Result<(), FulfillmentDbError>;

    /// Bulk-transitions every `Pending` order older than `older_than` to `Expired` in one conditional write,
    /// returning the orders that were expired.
    async fn expire_pending_orders(&self, older_than: Duration) -> Result<Vec<Order>, FulfillmentDbError>;

    /// Creates or refreshes the customer profile for a normalized email.
    async fn upsert_customer(
        &self,
        email: &str,
        name: &str,
        phone: Option<&str>,
    ) -> Result<Customer, FulfillmentDbError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), FulfillmentDbError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum FulfillmentDbError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderRef),
    #[error("Order {order_ref} is no longer {expected} (it is now {actual})")]
    StaleStatus { order_ref: OrderRef, expected: OrderStatusType, actual: OrderStatusType },
    #[error("Could not find an unused order number after {0} attempts")]
    OrderNumberSpaceExhausted(u32),
    #[error("{0}")]
    Transition(#[from] TransitionError),
}

impl From<sqlx::Error> for FulfillmentDbError {
    fn from(e: sqlx::Error) -> Self {
        FulfillmentDbError::DatabaseError(e.to_string())
    }
}
