mod money;

pub mod op;

pub use money::{MoneyCents, MoneyConversionError, DEFAULT_CURRENCY_CODE};
