//! # Fulfillment engine
//!
//! The storage and domain layer for the shop fulfillment gateway. It is responsible for:
//! * The order lifecycle state machine ([`status`]) and the conditional writes that enforce it.
//! * The concurrency-safe inventory ledger ([`InventoryApi`]) with its append-only movement log.
//! * Checkout intake ([`CheckoutApi`]), settlement and staff order flows ([`OrderFlowApi`]).
//! * Event hooks ([`events`]) that decouple notification fan-out from the transitions that trigger it.
//!
//! Storage backends implement the traits in [`traits`]; a SQLite implementation is provided behind the
//! `sqlite` feature (enabled by default).

pub mod db_types;
pub mod events;
pub mod helpers;
pub mod order_objects;
pub mod status;
pub mod traits;

mod ffe_api;

pub use ffe_api::{CheckoutApi, CheckoutError, CheckoutSettings, InventoryApi, OrderFlowApi, OrderFlowError};

#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

#[cfg(feature = "sqlite")]
pub mod test_utils;
