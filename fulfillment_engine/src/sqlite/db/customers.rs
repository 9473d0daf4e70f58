use sfg_common::Money;
use sqlx::SqliteConnection;

use crate::db_types::Customer;

/// Creates or refreshes a customer profile. Contact details are overwritten on every order so staff always see the
/// latest ones; the row itself is keyed by normalized email and never deleted.
pub(crate) async fn upsert_customer(
    email: &str,
    name: &str,
    phone: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Customer, sqlx::Error> {
    let customer = sqlx::query_as(
        r#"
        INSERT INTO customers (email, name, phone) VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE SET
            name = excluded.name,
            phone = COALESCE(excluded.phone, customers.phone),
            updated_at = CURRENT_TIMESTAMP
        RETURNING *;
        "#,
    )
    .bind(email)
    .bind(name)
    .bind(phone)
    .fetch_one(conn)
    .await?;
    Ok(customer)
}

pub(crate) async fn fetch_customer(email: &str, conn: &mut SqliteConnection) -> Result<Option<Customer>, sqlx::Error> {
    let customer = sqlx::query_as("SELECT * FROM customers WHERE email = $1").bind(email).fetch_optional(conn).await?;
    Ok(customer)
}

/// Lifetime value, derived at query time. Orders that settled count; pending, expired and cancelled ones do not.
pub(crate) async fn spend_for_customer(email: &str, conn: &mut SqliteConnection) -> Result<Money, sqlx::Error> {
    let total: (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(fiat_total), 0) FROM orders WHERE email = $1 AND status IN ('Paid', 'Processing', \
         'Shipped', 'Delivered')",
    )
    .bind(email)
    .fetch_one(conn)
    .await?;
    Ok(Money::from(total.0))
}
