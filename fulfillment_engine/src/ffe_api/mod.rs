mod checkout_api;
mod inventory_api;
mod order_flow_api;

pub use checkout_api::{CheckoutApi, CheckoutError, CheckoutSettings};
pub use inventory_api::InventoryApi;
pub use order_flow_api::{OrderFlowApi, OrderFlowError};
