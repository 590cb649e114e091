use thiserror::Error;

use crate::traits::{MerchantManagement, MonitorManagement, OrderManagement};

/// This trait defines the highest level of behaviour for backends supporting the reconciliation engine.
///
/// A backend must be cheap to clone: the request path and both scheduler loops each hold their own handle.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone + MerchantManagement + MonitorManagement + OrderManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentGatewayError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("Cannot insert order, since it already exists with code {0}")]
    OrderAlreadyExists(String),
    #[error("Another pending order already holds the amount {amount} for account #{account_id}")]
    AmountSlotTaken { account_id: i64, amount: String },
    #[error("The requested order (internal id {0}) does not exist")]
    OrderIdNotFound(i64),
    #[error("{0} minutes is not a usable order timeout")]
    InvalidTimeout(i64),
}

impl From<sqlx::Error> for PaymentGatewayError {
    fn from(e: sqlx::Error) -> Self {
        PaymentGatewayError::DatabaseError(e.to_string())
    }
}
