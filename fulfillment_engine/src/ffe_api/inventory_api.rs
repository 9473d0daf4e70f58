use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{InventoryLevel, InventoryMovement, NewMovement, OrderRef, StockAdjustment},
    events::{EventProducers, LowStockEvent},
    traits::{InventoryError, InventoryStore},
};

/// Bound on the read-compute-write cycle. Exhausting it surfaces as [`InventoryError::Conflict`]; retries are
/// immediate since the conflicting writer has already committed by the time we see the failure.
const MAX_CAS_ATTEMPTS: u32 = 3;

/// `InventoryApi` is the only path to a SKU's quantity. Every change is a compare-and-swap keyed on the quantity
/// that was just read, and every successful change carries its movement-log entry with it.
pub struct InventoryApi<B> {
    db: B,
    producers: EventProducers,
    low_stock_threshold: i64,
}

impl<B> Debug for InventoryApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InventoryApi")
    }
}

impl<B> InventoryApi<B> {
    pub fn new(db: B, producers: EventProducers, low_stock_threshold: i64) -> Self {
        Self { db, producers, low_stock_threshold }
    }
}

impl<B> InventoryApi<B>
where B: InventoryStore
{
    /// Applies a stock adjustment to a SKU.
    ///
    /// The full cycle is: read the current quantity, compute the candidate new quantity, then write conditionally
    /// on the stored quantity still being the one just read. A lost race restarts the cycle, up to
    /// [`MAX_CAS_ATTEMPTS`] times. The movement-log append rides in the same transaction as the conditional write.
    ///
    /// Returns the new quantity on success.
    pub async fn adjust(
        &self,
        sku: &str,
        adjustment: StockAdjustment,
        reason: &str,
        actor: &str,
        order_ref: Option<&OrderRef>,
    ) -> Result<i64, InventoryError> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let level =
                self.db.fetch_level(sku).await?.ok_or_else(|| InventoryError::SkuNotFound(sku.to_string()))?;
            let new_quantity = adjustment.target_quantity(level.quantity);
            if new_quantity == level.quantity
                && matches!(adjustment, StockAdjustment::Sale(n) | StockAdjustment::Remove(n) if n > 0)
            {
                // Nothing left to remove. A zero-delta movement would pollute the audit log, so reject instead.
                debug!("📦️ {sku}: {} rejected, no stock left", adjustment);
                return Err(InventoryError::Depleted { sku: sku.to_string() });
            }
            let movement = NewMovement {
                movement_type: adjustment.movement_type(),
                delta: new_quantity - level.quantity,
                reason: reason.to_string(),
                actor: actor.to_string(),
                order_ref: order_ref.cloned(),
            };
            if self.db.compare_and_set_quantity(sku, level.quantity, new_quantity, movement).await? {
                debug!("📦️ {sku}: {} applied, {} -> {new_quantity}", adjustment, level.quantity);
                if new_quantity < self.low_stock_threshold {
                    self.call_low_stock_hook(sku, new_quantity).await;
                }
                return Ok(new_quantity);
            }
            debug!("📦️ {sku}: lost the write race on attempt {attempt}/{MAX_CAS_ATTEMPTS}, re-reading");
        }
        warn!("📦️ {sku}: adjustment ({adjustment}) abandoned after {MAX_CAS_ATTEMPTS} attempts");
        Err(InventoryError::Conflict { sku: sku.to_string(), attempts: MAX_CAS_ATTEMPTS })
    }

    pub async fn level(&self, sku: &str) -> Result<InventoryLevel, InventoryError> {
        self.db.fetch_level(sku).await?.ok_or_else(|| InventoryError::SkuNotFound(sku.to_string()))
    }

    pub async fn movements(&self, sku: &str) -> Result<Vec<InventoryMovement>, InventoryError> {
        self.db.movements_for_sku(sku).await
    }

    /// Replays the movement log and checks that it reduces to the stored quantity. Returns the pair
    /// `(replayed, stored)` so callers can report the discrepancy when there is one.
    pub async fn reconcile(&self, sku: &str) -> Result<(i64, i64), InventoryError> {
        let movements = self.db.movements_for_sku(sku).await?;
        let stored = self.level(sku).await?.quantity;
        let replayed = match movements.first() {
            Some(first) => movements.iter().fold(first.quantity_before, |acc, m| acc + m.delta),
            None => stored,
        };
        Ok((replayed, stored))
    }

    async fn call_low_stock_hook(&self, sku: &str, quantity: i64) {
        let event = LowStockEvent { sku: sku.to_string(), quantity, threshold: self.low_stock_threshold };
        for emitter in &self.producers.low_stock_producer {
            trace!("📦️ Notifying low-stock hook subscribers for {sku}");
            emitter.publish_event(event.clone()).await;
        }
    }
}
