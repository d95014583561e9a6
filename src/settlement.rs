mod http_settlement_client;

pub use http_settlement_client::HttpSettlementClient;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Amount, BankToken, Reference, UserId};

/// Stateless bridge to the external settlement partner.
///
/// Both calls are synchronous request/response exchanges bounded by a
/// timeout. Nothing is persisted here.
#[async_trait]
pub trait SettlementClient {
    /// Asks the partner to open a payable order and returns the opaque token
    /// that later identifies the order in webhooks.
    async fn create_deposit_order(
        &self,
        reference: &Reference,
        amount: Amount,
        return_url: &str,
    ) -> Result<BankToken, SettlementError>;

    /// Asks the partner to accept an outbound payment. `Ok(false)` is a
    /// regular rejection by the partner.
    async fn request_withdrawal(
        &self,
        reference: &Reference,
        user_id: UserId,
        amount: Amount,
    ) -> Result<bool, SettlementError>;
}

#[derive(Debug, Error, PartialEq, Clone)]
pub enum SettlementError {
    #[error("The settlement partner did not answer in time.")]
    Timeout,
    #[error("The settlement partner is unreachable: {0}")]
    Unreachable(String),
    #[error("The settlement partner answered with status {0}.")]
    UnexpectedStatus(u16),
    #[error("The settlement partner did not return a bank token.")]
    MissingToken,
    #[error("The settlement partner sent an invalid response: {0}")]
    InvalidResponse(String),
}
