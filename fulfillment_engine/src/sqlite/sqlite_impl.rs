//! `SqliteDatabase` is a concrete implementation of a fulfillment engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module.
use std::fmt::Debug;

use chrono::Duration;
use log::*;
use sfg_common::{CoinAmount, Money};
use sqlx::SqlitePool;

use super::db::{customers, inventory, new_pool, orders};
use crate::{
    db_types::{
        Customer,
        InventoryLevel,
        InventoryMovement,
        NewMovement,
        NewOrder,
        Order,
        OrderRef,
        OrderStatusType,
        TrackingEvent,
    },
    helpers::new_order_number,
    order_objects::OrderQueryFilter,
    traits::{FulfillmentDatabase, FulfillmentDbError, InventoryError, InventoryStore, OrderManagement},
};

/// Bound on order-number generation retries. The number space is ~33 million codes, so hitting this means the
/// shop has been rather more successful than this backend was sized for.
const MAX_ORDER_NUMBER_ATTEMPTS: u32 = 10;

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl OrderManagement for SqliteDatabase {
    async fn fetch_order_by_ref(&self, order_ref: &OrderRef) -> Result<Option<Order>, FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_ref(order_ref, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_number(&self, number: &str) -> Result<Option<Order>, FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_number(number, &mut conn).await?;
        Ok(order)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(query, &mut conn).await?;
        Ok(orders)
    }

    async fn fetch_orders_in_status(&self, status: OrderStatusType) -> Result<Vec<Order>, FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_orders_in_status(status, &mut conn).await?;
        Ok(orders)
    }

    async fn fetch_customer(&self, email: &str) -> Result<Option<Customer>, FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        let customer = customers::fetch_customer(email, &mut conn).await?;
        Ok(customer)
    }

    async fn spend_for_customer(&self, email: &str) -> Result<Money, FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        let spend = customers::spend_for_customer(email, &mut conn).await?;
        Ok(spend)
    }
}

impl FulfillmentDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, FulfillmentDbError> {
        let mut tx = self.pool.begin().await?;
        let mut number = None;
        for _ in 0..MAX_ORDER_NUMBER_ATTEMPTS {
            let candidate = new_order_number();
            if orders::order_number_exists(&candidate, &mut tx).await?.is_none() {
                number = Some(candidate);
                break;
            }
        }
        let number = number.ok_or(FulfillmentDbError::OrderNumberSpaceExhausted(MAX_ORDER_NUMBER_ATTEMPTS))?;
        let order = orders::insert_order(order, &number, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {} saved with number {} and id {}", order.order_ref, order.order_number, order.id);
        Ok(order)
    }

    async fn update_order_status(
        &self,
        order_ref: &OrderRef,
        expected: OrderStatusType,
        new_status: OrderStatusType,
    ) -> Result<Order, FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        match orders::update_order_status(order_ref, expected, new_status, &mut conn).await? {
            Some(order) => {
                debug!("🗃️ Order {order_ref} moved {expected} -> {new_status}");
                Ok(order)
            },
            None => match orders::fetch_order_by_ref(order_ref, &mut conn).await? {
                Some(current) => {
                    Err(FulfillmentDbError::StaleStatus { order_ref: order_ref.clone(), expected, actual: current.status })
                },
                None => Err(FulfillmentDbError::OrderNotFound(order_ref.clone())),
            },
        }
    }

    async fn record_settlement(
        &self,
        order_ref: &OrderRef,
        amount: Option<CoinAmount>,
    ) -> Result<(), FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        orders::record_settlement(order_ref, amount, &mut conn).await?;
        Ok(())
    }

    async fn mark_order_shipped(
        &self,
        order_ref: &OrderRef,
        expected: OrderStatusType,
        carrier: &str,
        tracking_number: &str,
        shipping_cost: Option<Money>,
    ) -> Result<Order, FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        match orders::mark_shipped(order_ref, expected, carrier, tracking_number, shipping_cost, &mut conn).await? {
            Some(order) => {
                debug!("🗃️ Order {order_ref} shipped via {carrier} ({tracking_number})");
                Ok(order)
            },
            None => match orders::fetch_order_by_ref(order_ref, &mut conn).await? {
                Some(current) => {
                    Err(FulfillmentDbError::StaleStatus { order_ref: order_ref.clone(), expected, actual: current.status })
                },
                None => Err(FulfillmentDbError::OrderNotFound(order_ref.clone())),
            },
        }
    }

    async fn append_note(&self, order_ref: &OrderRef, note: &str) -> Result<(), FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        orders::append_note(order_ref, note, &mut conn).await?;
        Ok(())
    }

    async fn update_tracking(
        &self,
        order_ref: &OrderRef,
        status: &str,
        events: &[TrackingEvent],
    ) -> Result<(), FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        orders::update_tracking(order_ref, status, events, &mut conn).await?;
        Ok(())
    }

    async fn expire_pending_orders(&self, older_than: Duration) -> Result<Vec<Order>, FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        let expired = orders::expire_pending(older_than, &mut conn).await?;
        Ok(expired)
    }

    async fn upsert_customer(
        &self,
        email: &str,
        name: &str,
        phone: Option<&str>,
    ) -> Result<Customer, FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        let customer = customers::upsert_customer(email, name, phone, &mut conn).await?;
        trace!("🗃️ Customer profile for {email} refreshed");
        Ok(customer)
    }
}

impl InventoryStore for SqliteDatabase {
    async fn fetch_level(&self, sku: &str) -> Result<Option<InventoryLevel>, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        let level = inventory::fetch_level(sku, &mut conn).await?;
        Ok(level)
    }

    /// The quantity swap and the movement append commit or roll back together; a movement can never describe a
    /// change that did not land, and a change can never go unrecorded.
    async fn compare_and_set_quantity(
        &self,
        sku: &str,
        expected: i64,
        new: i64,
        movement: NewMovement,
    ) -> Result<bool, InventoryError> {
        let mut tx = self.pool.begin().await?;
        let swapped = inventory::cas_quantity(sku, expected, new, &mut tx).await?;
        if swapped {
            inventory::insert_movement(sku, &movement, expected, new, &mut tx).await?;
        }
        tx.commit().await?;
        Ok(swapped)
    }

    async fn movements_for_sku(&self, sku: &str) -> Result<Vec<InventoryMovement>, InventoryError> {
        let mut conn = self.pool.acquire().await?;
        let movements = inventory::movements_for_sku(sku, &mut conn).await?;
        Ok(movements)
    }

    async fn provision_sku(&self, sku: &str, quantity: i64) -> Result<(), InventoryError> {
        let mut conn = self.pool.acquire().await?;
        inventory::provision_sku(sku, quantity, &mut conn).await?;
        Ok(())
    }
}
