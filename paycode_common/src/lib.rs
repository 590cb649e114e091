mod amount;
mod helpers;
mod secret;

pub use amount::{Amount, AmountConversionError};
pub use helpers::parse_boolean_flag;
pub use secret::Secret;
