use thiserror::Error;

use crate::{helpers::SignatureError, traits::PaymentGatewayError};

#[derive(Debug, Clone, Error)]
pub enum MonitorApiError {
    #[error("The message signature is invalid")]
    InvalidSignature,
    #[error("Unknown merchant: {0}")]
    UnknownMerchant(String),
    #[error("No secret key is configured for account #{0}")]
    SecretNotConfigured(i64),
    #[error("Invalid payment kind: {0}")]
    InvalidKind(String),
    #[error("Invalid price: {0}")]
    InvalidPrice(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<PaymentGatewayError> for MonitorApiError {
    fn from(e: PaymentGatewayError) -> Self {
        Self::DatabaseError(e.to_string())
    }
}

impl From<SignatureError> for MonitorApiError {
    fn from(_: SignatureError) -> Self {
        Self::InvalidSignature
    }
}
