mod coin_amount;
mod helpers;
mod money;

pub mod op;
mod secret;

pub use coin_amount::{CoinAmount, COIN_SCALE};
pub use helpers::parse_boolean_flag;
pub use money::{Money, MoneyConversionError};
pub use secret::Secret;
