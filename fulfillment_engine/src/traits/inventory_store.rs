use thiserror::Error;

use crate::db_types::{InventoryLevel, InventoryMovement, NewMovement};

/// Storage behaviour for the inventory ledger.
///
/// The quantity column is the serialization point for stock races: the only way to change it is
/// [`InventoryStore::compare_and_set_quantity`], which also appends the movement-log entry in the same transaction,
/// so a successful swap and its audit record are atomic together.
#[allow(async_fn_in_trait)]
pub trait InventoryStore: Clone {
    /// Current quantity and last-updated timestamp for a SKU.
    async fn fetch_level(&self, sku: &str) -> Result<Option<InventoryLevel>, InventoryError>;

    /// Conditionally writes `new` as the quantity for `sku`, succeeding only if the stored quantity still equals
    /// `expected`. On success the movement is appended in the same transaction and `true` is returned; a lost race
    /// returns `false` and writes nothing.
    async fn compare_and_set_quantity(
        &self,
        sku: &str,
        expected: i64,
        new: i64,
        movement: NewMovement,
    ) -> Result<bool, InventoryError>;

    /// The full movement log for a SKU in creation order.
    async fn movements_for_sku(&self, sku: &str) -> Result<Vec<InventoryMovement>, InventoryError>;

    /// Creates the inventory record for a SKU if it does not exist yet. Existing records are left untouched.
    async fn provision_sku(&self, sku: &str, quantity: i64) -> Result<(), InventoryError>;
}

#[derive(Debug, Clone, Error)]
pub enum InventoryError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("No inventory record exists for SKU {0}")]
    SkuNotFound(String),
    #[error("SKU {sku} has no stock left to remove")]
    Depleted { sku: String },
    #[error("Could not adjust stock for SKU {sku}: lost the write race {attempts} times. Please retry.")]
    Conflict { sku: String, attempts: u32 },
}

impl From<sqlx::Error> for InventoryError {
    fn from(e: sqlx::Error) -> Self {
        InventoryError::DatabaseError(e.to_string())
    }
}
