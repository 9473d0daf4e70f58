use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sfg_common::{CoinAmount, Money};
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;

//--------------------------------------       OrderRef        -------------------------------------------------------
/// The opaque order reference. It appears in customer-facing URLs and correlates the payment processor's webhook
/// calls with the order they settle. Generated as 32 hex characters at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderRef(pub String);

impl FromStr for OrderRef {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------   OrderStatusType     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// Newly created. A payment address has been issued, but no settlement has been received.
    Pending,
    /// Settlement confirmed by the payment processor. Stock has been decremented.
    Paid,
    /// Being picked and packed by staff.
    Processing,
    /// Handed to the carrier. Carrier and tracking number are recorded.
    Shipped,
    /// The carrier reports delivery. Terminal.
    Delivered,
    /// Cancelled by the customer or an admin. Terminal.
    Cancelled,
    /// Pending for longer than the expiry window with no settlement. Terminal.
    Expired,
    /// Fully refunded. Terminal.
    Refunded,
    /// Refunded for less than the order total. Terminal.
    PartiallyRefunded,
}

impl OrderStatusType {
    /// True for statuses that permit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatusType::Delivered
                | OrderStatusType::Cancelled
                | OrderStatusType::Expired
                | OrderStatusType::Refunded
                | OrderStatusType::PartiallyRefunded
        )
    }

    /// True once the order's payment has been accepted. Webhook deliveries for orders in any of these states are
    /// duplicates.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            OrderStatusType::Paid
                | OrderStatusType::Processing
                | OrderStatusType::Shipped
                | OrderStatusType::Delivered
        )
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Pending => write!(f, "Pending"),
            OrderStatusType::Paid => write!(f, "Paid"),
            OrderStatusType::Processing => write!(f, "Processing"),
            OrderStatusType::Shipped => write!(f, "Shipped"),
            OrderStatusType::Delivered => write!(f, "Delivered"),
            OrderStatusType::Cancelled => write!(f, "Cancelled"),
            OrderStatusType::Expired => write!(f, "Expired"),
            OrderStatusType::Refunded => write!(f, "Refunded"),
            OrderStatusType::PartiallyRefunded => write!(f, "PartiallyRefunded"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            "Processing" => Ok(Self::Processing),
            "Shipped" => Ok(Self::Shipped),
            "Delivered" => Ok(Self::Delivered),
            "Cancelled" => Ok(Self::Cancelled),
            "Expired" => Ok(Self::Expired),
            "Refunded" => Ok(Self::Refunded),
            "PartiallyRefunded" => Ok(Self::PartiallyRefunded),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Pending");
            OrderStatusType::Pending
        })
    }
}

//--------------------------------------   ShippingAddress     -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub postcode: String,
    pub country: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl Display for ShippingAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}, {} {}, {}", self.name, self.line1, self.city, self.postcode, self.country)
    }
}

//--------------------------------------      LineItem         -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub sku: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl LineItem {
    pub fn new<S: Into<String>>(sku: S, quantity: u32, unit_price: Money) -> Self {
        Self { sku: sku.into(), quantity, unit_price }
    }

    pub fn total(&self) -> Money {
        self.unit_price * i64::from(self.quantity)
    }
}

//--------------------------------------    TrackingEvent      -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub status: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

//--------------------------------------        Order          -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Order {
    pub id: i64,
    pub order_ref: OrderRef,
    /// Short human-facing order number. Globally unique, collision-checked at creation.
    pub order_number: String,
    pub status: OrderStatusType,
    pub fiat_total: Money,
    /// The crypto currency the customer elected to pay with.
    pub currency: String,
    pub crypto_amount: CoinAmount,
    /// The amount the processor reported at settlement, when it reported one.
    pub settled_amount: Option<CoinAmount>,
    /// The processor-issued payment address. Absent on staff-created manual orders.
    pub payment_address: Option<String>,
    pub email: String,
    pub shipping_address: Json<ShippingAddress>,
    pub items: Json<Vec<LineItem>>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub shipping_cost: Option<Money>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub tracking_status: Option<String>,
    pub tracking_events: Json<Vec<TrackingEvent>>,
    /// Append-only log of administrative actions (refund annotations and the like).
    pub notes: String,
    /// Present when a staff member created the order manually, bypassing payment.
    pub placed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// The summed quantity across line items. This is the amount the inventory ledger moves by at settlement,
    /// cancellation and refund.
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

impl Display for Order {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "Order {} ({})", self.order_ref, self.order_number),
        }
    }
}

//--------------------------------------      NewOrder         -------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// Generated up front (before the order is persisted) so the payment processor can be handed the reference
    /// its webhook will later correlate on.
    pub order_ref: OrderRef,
    pub email: String,
    pub shipping_address: ShippingAddress,
    pub items: Vec<LineItem>,
    pub fiat_total: Money,
    pub currency: String,
    pub crypto_amount: CoinAmount,
    pub payment_address: Option<String>,
    /// The status the order is born in. Checkout creates `Pending` orders; staff manual orders are created `Paid`.
    pub status: OrderStatusType,
    pub placed_by: Option<String>,
}

impl NewOrder {
    pub fn new(email: String, shipping_address: ShippingAddress, items: Vec<LineItem>, fiat_total: Money) -> Self {
        Self {
            order_ref: OrderRef(crate::helpers::new_order_ref()),
            email,
            shipping_address,
            items,
            fiat_total,
            currency: String::new(),
            crypto_amount: CoinAmount::default(),
            payment_address: None,
            status: OrderStatusType::Pending,
            placed_by: None,
        }
    }

    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

//--------------------------------------    MovementType       -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum MovementType {
    /// Stock added by staff (restock, or restoration after a cancellation).
    Add,
    /// Stock removed by staff (damage, shrinkage).
    Remove,
    /// Stock sold against a settled order.
    Sale,
    /// Stock restored by a refund.
    Refund,
    /// Direct correction to an absolute quantity.
    Edit,
}

impl Display for MovementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MovementType::Add => write!(f, "Add"),
            MovementType::Remove => write!(f, "Remove"),
            MovementType::Sale => write!(f, "Sale"),
            MovementType::Refund => write!(f, "Refund"),
            MovementType::Edit => write!(f, "Edit"),
        }
    }
}

impl FromStr for MovementType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Add" => Ok(Self::Add),
            "Remove" => Ok(Self::Remove),
            "Sale" => Ok(Self::Sale),
            "Refund" => Ok(Self::Refund),
            "Edit" => Ok(Self::Edit),
            s => Err(ConversionError(format!("Invalid movement type: {s}"))),
        }
    }
}

//--------------------------------------   StockAdjustment     -------------------------------------------------------
/// A requested change to a SKU's quantity. `Remove` and `Sale` clip at zero; `SetTo` is an absolute correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "qty", rename_all = "snake_case")]
pub enum StockAdjustment {
    Add(u32),
    Remove(u32),
    Sale(u32),
    Refund(u32),
    SetTo(u32),
}

impl StockAdjustment {
    pub fn movement_type(&self) -> MovementType {
        match self {
            StockAdjustment::Add(_) => MovementType::Add,
            StockAdjustment::Remove(_) => MovementType::Remove,
            StockAdjustment::Sale(_) => MovementType::Sale,
            StockAdjustment::Refund(_) => MovementType::Refund,
            StockAdjustment::SetTo(_) => MovementType::Edit,
        }
    }

    /// The quantity the record should hold after applying this adjustment to `current`.
    pub fn target_quantity(&self, current: i64) -> i64 {
        match self {
            StockAdjustment::Add(n) | StockAdjustment::Refund(n) => current + i64::from(*n),
            StockAdjustment::Remove(n) | StockAdjustment::Sale(n) => (current - i64::from(*n)).max(0),
            StockAdjustment::SetTo(n) => i64::from(*n),
        }
    }
}

impl Display for StockAdjustment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StockAdjustment::Add(n) => write!(f, "add {n}"),
            StockAdjustment::Remove(n) => write!(f, "remove {n}"),
            StockAdjustment::Sale(n) => write!(f, "sale of {n}"),
            StockAdjustment::Refund(n) => write!(f, "refund of {n}"),
            StockAdjustment::SetTo(n) => write!(f, "set to {n}"),
        }
    }
}

//--------------------------------------   InventoryLevel      -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct InventoryLevel {
    pub sku: String,
    pub quantity: i64,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------  InventoryMovement    -------------------------------------------------------
/// One immutable audit-log entry describing a single inventory quantity change. The sequence of movements for a SKU,
/// replayed in creation order, reduces to the current quantity.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct InventoryMovement {
    pub id: i64,
    pub sku: String,
    pub movement_type: MovementType,
    pub delta: i64,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub reason: String,
    pub actor: String,
    pub order_ref: Option<OrderRef>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------     NewMovement       -------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub movement_type: MovementType,
    pub delta: i64,
    pub reason: String,
    pub actor: String,
    pub order_ref: Option<OrderRef>,
}

//--------------------------------------      Customer         -------------------------------------------------------
/// Denormalized contact profile keyed by normalized email. Upserted on every checkout and manual order. Lifetime
/// value is not stored here; it is derived from orders at query time.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Customer {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        Role           -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// May read any order, customer or inventory record.
    ReadAll,
    /// May drive order transitions, refunds, manual orders and inventory adjustments.
    Write,
    /// May do everything, including key administration.
    SuperAdmin,
}

pub type Roles = Vec<Role>;

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::ReadAll => write!(f, "read_all"),
            Role::Write => write!(f, "write"),
            Role::SuperAdmin => write!(f, "super_admin"),
        }
    }
}

impl FromStr for Role {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read_all" | "readall" => Ok(Self::ReadAll),
            "write" => Ok(Self::Write),
            "super_admin" | "superadmin" => Ok(Self::SuperAdmin),
            s => Err(ConversionError(format!("Invalid role: {s}"))),
        }
    }
}

//--------------------------------------  SettlementOutcome    -------------------------------------------------------
/// The result of feeding a settlement notification into the order flow.
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    /// First settlement for this order. The order has moved to `Paid`.
    Settled(Order),
    /// The order was already settled; the notification is an at-least-once duplicate and nothing was changed.
    Duplicate(Order),
}
