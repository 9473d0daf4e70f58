use chrono::Duration;
use log::{debug, trace};
use sfg_common::{CoinAmount, Money};
use sqlx::{types::Json, QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderRef, OrderStatusType, TrackingEvent},
    order_objects::OrderQueryFilter,
    traits::FulfillmentDbError,
};

/// Inserts a new order row. The order carries its own fresh `order_ref`; the caller supplies a collision-checked
/// `order_number`; timestamps and default columns come from the schema.
pub(crate) async fn insert_order(
    order: NewOrder,
    order_number: &str,
    conn: &mut SqliteConnection,
) -> Result<Order, FulfillmentDbError> {
    let order_row = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_ref,
                order_number,
                status,
                fiat_total,
                currency,
                crypto_amount,
                payment_address,
                email,
                shipping_address,
                items,
                placed_by
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *;
        "#,
    )
    .bind(order.order_ref.0)
    .bind(order_number)
    .bind(order.status.to_string())
    .bind(order.fiat_total)
    .bind(order.currency)
    .bind(order.crypto_amount)
    .bind(order.payment_address)
    .bind(order.email)
    .bind(Json(order.shipping_address))
    .bind(Json(order.items))
    .bind(order.placed_by)
    .fetch_one(conn)
    .await?;
    Ok(order_row)
}

/// Checks whether an order number is already taken. Returns the row id when it is.
pub(crate) async fn order_number_exists(
    number: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<i64>, sqlx::Error> {
    let id: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM orders WHERE order_number = $1").bind(number).fetch_optional(conn).await?;
    Ok(id.map(|r| r.0))
}

pub(crate) async fn fetch_order_by_ref(
    order_ref: &OrderRef,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE order_ref = $1")
        .bind(order_ref.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub(crate) async fn fetch_order_by_number(
    number: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_number = $1").bind(number).fetch_optional(conn).await?;
    Ok(order)
}

pub(crate) async fn fetch_orders_in_status(
    status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as("SELECT * FROM orders WHERE status = $1 ORDER BY created_at ASC")
        .bind(status.to_string())
        .fetch_all(conn)
        .await?;
    Ok(orders)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`.
///
/// Resulting orders are ordered by `created_at` in ascending order
pub(crate) async fn search_orders(
    query: OrderQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(order_ref) = query.order_ref {
        where_clause.push("order_ref = ");
        where_clause.push_bind_unseparated(order_ref.0);
    }
    if let Some(number) = query.order_number {
        where_clause.push("order_number = ");
        where_clause.push_bind_unseparated(number);
    }
    if let Some(email) = query.email {
        where_clause.push("email = ");
        where_clause.push_bind_unseparated(email);
    }
    if let Some(status) = query.status {
        where_clause.push("status = ");
        where_clause.push_bind_unseparated(status.to_string());
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC");
    trace!("📝️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("📝️ Order search returned {} rows", orders.len());
    Ok(orders)
}

/// The conditional status write. Succeeds only if the stored status still equals `expected`, which makes the
/// status column the serialization point for concurrent transitions on the same order.
pub(crate) async fn update_order_status(
    order_ref: &OrderRef,
    expected: OrderStatusType,
    new_status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let result = sqlx::query_as(
        "UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE order_ref = $2 AND status = $3 \
         RETURNING *",
    )
    .bind(new_status.to_string())
    .bind(order_ref.as_str())
    .bind(expected.to_string())
    .fetch_optional(conn)
    .await?;
    Ok(result)
}

/// Conditional transition into `Shipped` that records the shipment fields in the same write.
pub(crate) async fn mark_shipped(
    order_ref: &OrderRef,
    expected: OrderStatusType,
    carrier: &str,
    tracking_number: &str,
    shipping_cost: Option<Money>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let result = sqlx::query_as(
        r#"
        UPDATE orders SET
            status = 'Shipped',
            carrier = $1,
            tracking_number = $2,
            shipping_cost = $3,
            shipped_at = CURRENT_TIMESTAMP,
            updated_at = CURRENT_TIMESTAMP
        WHERE order_ref = $4 AND status = $5
        RETURNING *;
        "#,
    )
    .bind(carrier)
    .bind(tracking_number)
    .bind(shipping_cost)
    .bind(order_ref.as_str())
    .bind(expected.to_string())
    .fetch_optional(conn)
    .await?;
    Ok(result)
}

pub(crate) async fn record_settlement(
    order_ref: &OrderRef,
    amount: Option<CoinAmount>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET settled_amount = $1, updated_at = CURRENT_TIMESTAMP WHERE order_ref = $2")
        .bind(amount)
        .bind(order_ref.as_str())
        .execute(conn)
        .await?;
    Ok(())
}

/// Appends to the order's notes column. Notes are append-only; there is no way to rewrite history from here.
pub(crate) async fn append_note(
    order_ref: &OrderRef,
    note: &str,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET notes = notes || $1, updated_at = CURRENT_TIMESTAMP WHERE order_ref = $2")
        .bind(note)
        .bind(order_ref.as_str())
        .execute(conn)
        .await?;
    Ok(())
}

pub(crate) async fn update_tracking(
    order_ref: &OrderRef,
    status: &str,
    events: &[TrackingEvent],
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE orders SET tracking_status = $1, tracking_events = $2, updated_at = CURRENT_TIMESTAMP WHERE \
         order_ref = $3",
    )
    .bind(status)
    .bind(Json(events.to_vec()))
    .bind(order_ref.as_str())
    .execute(conn)
    .await?;
    Ok(())
}

/// Bulk-expires stale pending orders in one conditional write. The `status = 'Pending'` predicate makes this safe
/// to run concurrently with live settlements: an order that settles mid-sweep no longer matches.
pub(crate) async fn expire_pending(
    older_than: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let rows = sqlx::query_as(
        format!(
            "UPDATE orders SET status = 'Expired', updated_at = CURRENT_TIMESTAMP WHERE status = 'Pending' AND \
             (unixepoch(CURRENT_TIMESTAMP) - unixepoch(created_at)) > {} RETURNING *;",
            older_than.num_seconds()
        )
        .as_str(),
    )
    .fetch_all(conn)
    .await?;
    debug!("📝️ {} pending orders expired", rows.len());
    Ok(rows)
}
