use crate::{
    db_types::{Customer, Order, OrderRef, OrderStatusType},
    order_objects::OrderQueryFilter,
    traits::FulfillmentDbError,
};

/// Read-side access to orders and customers. Available to any handler that only needs to look, not touch.
#[allow(async_fn_in_trait)]
pub trait OrderManagement: Clone {
    /// Fetches an order by its opaque reference.
    async fn fetch_order_by_ref(&self, order_ref: &OrderRef) -> Result<Option<Order>, FulfillmentDbError>;

    /// Fetches an order by its short human-facing order number.
    async fn fetch_order_by_number(&self, number: &str) -> Result<Option<Order>, FulfillmentDbError>;

    /// Fetches orders according to the criteria in the filter, ordered by `created_at` ascending.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, FulfillmentDbError>;

    /// All orders currently in the given status.
    async fn fetch_orders_in_status(&self, status: OrderStatusType) -> Result<Vec<Order>, FulfillmentDbError>;

    /// Fetches the customer profile for a normalized email, if one exists.
    async fn fetch_customer(&self, email: &str) -> Result<Option<Customer>, FulfillmentDbError>;

    /// Lifetime spend for a customer, derived by aggregating their settled orders at query time.
    async fn spend_for_customer(&self, email: &str) -> Result<sfg_common::Money, FulfillmentDbError>;
}
