use log::trace;
use sqlx::SqliteConnection;

use crate::db_types::{InventoryLevel, InventoryMovement, NewMovement};

pub(crate) async fn fetch_level(sku: &str, conn: &mut SqliteConnection) -> Result<Option<InventoryLevel>, sqlx::Error> {
    let level = sqlx::query_as("SELECT sku, quantity, updated_at FROM inventory WHERE sku = $1")
        .bind(sku)
        .fetch_optional(conn)
        .await?;
    Ok(level)
}

/// The compare-and-swap write. The quantity only changes if it still holds the value the caller read; a lost race
/// affects zero rows and the caller retries from a fresh read.
pub(crate) async fn cas_quantity(
    sku: &str,
    expected: i64,
    new: i64,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE inventory SET quantity = $1, updated_at = CURRENT_TIMESTAMP WHERE sku = $2 AND quantity = $3")
            .bind(new)
            .bind(sku)
            .bind(expected)
            .execute(conn)
            .await?;
    let swapped = result.rows_affected() == 1;
    trace!("📦️ CAS {sku}: {expected} -> {new} ({})", if swapped { "applied" } else { "lost race" });
    Ok(swapped)
}

/// Appends one movement-log entry. Movements are immutable once written; there are no update or delete paths.
pub(crate) async fn insert_movement(
    sku: &str,
    movement: &NewMovement,
    quantity_before: i64,
    quantity_after: i64,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO inventory_movements (sku, movement_type, delta, quantity_before, quantity_after, reason, actor, order_ref)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8);
        "#,
    )
    .bind(sku)
    .bind(movement.movement_type.to_string())
    .bind(movement.delta)
    .bind(quantity_before)
    .bind(quantity_after)
    .bind(&movement.reason)
    .bind(&movement.actor)
    .bind(movement.order_ref.as_ref().map(|r| r.as_str().to_string()))
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn movements_for_sku(
    sku: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<InventoryMovement>, sqlx::Error> {
    let movements = sqlx::query_as("SELECT * FROM inventory_movements WHERE sku = $1 ORDER BY id ASC")
        .bind(sku)
        .fetch_all(conn)
        .await?;
    Ok(movements)
}

pub(crate) async fn provision_sku(sku: &str, quantity: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO inventory (sku, quantity) VALUES ($1, $2) ON CONFLICT (sku) DO NOTHING")
        .bind(sku)
        .bind(quantity)
        .execute(conn)
        .await?;
    Ok(())
}
