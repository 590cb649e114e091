use paycode_common::Secret;

use crate::traits::PaymentGatewayError;

/// Read-only access to merchant configuration. The rows behind this trait are administered elsewhere.
#[allow(async_fn_in_trait)]
pub trait MerchantManagement {
    /// Looks up the internal account id for an external merchant identifier (the `appid` a monitor agent sends).
    /// Only active mappings are considered. Returns `None` when there is no active mapping.
    async fn fetch_account_id_for_app_id(&self, app_id: &str) -> Result<Option<i64>, PaymentGatewayError>;

    /// Fetches the shared secret for the account. Returns `None` when no secret (or an empty one) is configured.
    async fn fetch_secret_key(&self, account_id: i64) -> Result<Option<Secret<String>>, PaymentGatewayError>;

    /// The per-account order timeout override, in minutes. Missing, unparsable and non-positive values all yield
    /// `None`, meaning the caller should fall back to its default.
    async fn fetch_order_timeout(&self, account_id: i64) -> Result<Option<i64>, PaymentGatewayError>;
}
