use std::fmt::Debug;

use log::*;
use sfg_common::{CoinAmount, Money};
use thiserror::Error;

use crate::{
    db_types::{LineItem, NewOrder},
    helpers::{is_valid_email, normalize_email, DiscountSchedule},
    order_objects::{CheckoutReceipt, CheckoutRequest},
    traits::{
        CollaboratorError,
        FulfillmentDatabase,
        FulfillmentDbError,
        InventoryError,
        InventoryStore,
        PaymentProcessor,
    },
};

/// Shop-level checkout parameters. There is a single SKU for sale; everything else is derived.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub sku: String,
    /// Undiscounted unit price in whole currency units.
    pub base_price: Money,
    pub max_quantity: u32,
    pub schedule: DiscountSchedule,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            sku: "SFG-001".to_string(),
            base_price: Money::from(12),
            max_quantity: 100,
            schedule: DiscountSchedule::default(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum CheckoutError {
    #[error("Invalid checkout request: {0}")]
    Validation(String),
    #[error("Not enough stock: {available} available, {requested} requested")]
    InsufficientStock { available: i64, requested: u32 },
    #[error("The computed amount {amount} is below the processor minimum of {minimum}")]
    BelowProcessorMinimum { amount: CoinAmount, minimum: CoinAmount },
    #[error("The payment processor could not be reached: {0}")]
    ProcessorUnavailable(String),
    #[error("{0}")]
    Database(#[from] FulfillmentDbError),
    #[error("{0}")]
    Inventory(#[from] InventoryError),
}

/// `CheckoutApi` turns a validated purchase request into a `Pending` order with a payment address attached.
///
/// Stock is checked but deliberately not reserved here. Two simultaneous checkouts can both pass the check and
/// race for the last unit at settlement time; the settlement-time compare-and-swap is the true scarcity gate.
pub struct CheckoutApi<B> {
    db: B,
    settings: CheckoutSettings,
}

impl<B> Debug for CheckoutApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutApi")
    }
}

impl<B> CheckoutApi<B> {
    pub fn new(db: B, settings: CheckoutSettings) -> Self {
        Self { db, settings }
    }

    pub fn settings(&self) -> &CheckoutSettings {
        &self.settings
    }
}

impl<B> CheckoutApi<B>
where B: FulfillmentDatabase
{
    /// Validates the request, prices it, obtains a payment address from the processor and persists the order as
    /// `Pending`. The customer profile is upserted as part of the same flow.
    pub async fn place_order<P: PaymentProcessor>(
        &self,
        request: CheckoutRequest,
        processor: &P,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        self.validate(&request)?;
        let quantity = request.quantity;
        let unit_price = self.settings.schedule.unit_price(self.settings.base_price, quantity);
        let fiat_total = unit_price * i64::from(quantity);
        trace!("🛒️ Quoting {quantity} x {} at {unit_price} each = {fiat_total}", self.settings.sku);

        // Advisory only. Nothing is held for this order; settlement is the scarcity gate.
        let level = self
            .db
            .fetch_level(&self.settings.sku)
            .await?
            .ok_or_else(|| InventoryError::SkuNotFound(self.settings.sku.clone()))?;
        if level.quantity < i64::from(quantity) {
            debug!("🛒️ Rejecting checkout: {} in stock, {quantity} requested", level.quantity);
            return Err(CheckoutError::InsufficientStock { available: level.quantity, requested: quantity });
        }

        let items = vec![LineItem::new(&self.settings.sku, quantity, unit_price)];
        let mut order = NewOrder::new(normalize_email(&request.email), request.address.clone(), items, fiat_total);
        order.currency = request.currency.trim().to_ascii_uppercase();

        let quote = processor.request_payment(&order.order_ref, &order.currency, fiat_total).await.map_err(
            |e| match e {
                CollaboratorError::Rejected(msg) => CheckoutError::Validation(msg),
                CollaboratorError::Unreachable(msg) => CheckoutError::ProcessorUnavailable(msg),
            },
        )?;
        if quote.crypto_amount < quote.minimum {
            debug!("🛒️ Rejecting checkout: {} is below the processor minimum {}", quote.crypto_amount, quote.minimum);
            return Err(CheckoutError::BelowProcessorMinimum { amount: quote.crypto_amount, minimum: quote.minimum });
        }
        order.crypto_amount = quote.crypto_amount;
        order.payment_address = Some(quote.payment_address);

        let stored = self.db.insert_order(order).await?;
        self.db.upsert_customer(&stored.email, &request.address.name, request.address.phone.as_deref()).await?;
        info!(
            "🛒️ Order {} ({}) created: {quantity} x {} for {} awaiting payment at {}",
            stored.order_ref,
            stored.order_number,
            self.settings.sku,
            stored.email,
            stored.payment_address.as_deref().unwrap_or("<none>")
        );
        Ok(CheckoutReceipt {
            order_ref: stored.order_ref,
            order_number: stored.order_number,
            payment_address: stored.payment_address.unwrap_or_default(),
            crypto_amount: stored.crypto_amount,
            currency: stored.currency,
            fiat_total: stored.fiat_total,
        })
    }

    fn validate(&self, request: &CheckoutRequest) -> Result<(), CheckoutError> {
        if !is_valid_email(&request.email) {
            return Err(CheckoutError::Validation("A valid email address is required".to_string()));
        }
        if request.quantity < 1 || request.quantity > self.settings.max_quantity {
            return Err(CheckoutError::Validation(format!(
                "Quantity must be between 1 and {}",
                self.settings.max_quantity
            )));
        }
        if request.currency.trim().is_empty() {
            return Err(CheckoutError::Validation("A payment currency is required".to_string()));
        }
        let addr = &request.address;
        if addr.name.trim().len() < 2 {
            return Err(CheckoutError::Validation("Recipient name is too short".to_string()));
        }
        if addr.line1.trim().len() < 5 {
            return Err(CheckoutError::Validation("Street address is too short".to_string()));
        }
        if addr.city.trim().len() < 2 {
            return Err(CheckoutError::Validation("City is too short".to_string()));
        }
        if addr.postcode.trim().len() < 3 {
            return Err(CheckoutError::Validation("Postal code is too short".to_string()));
        }
        if addr.country.trim().len() < 2 {
            return Err(CheckoutError::Validation("Country is required".to_string()));
        }
        Ok(())
    }
}
