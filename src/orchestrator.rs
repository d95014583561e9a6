mod depositor;
mod purchaser;
pub mod saga;
mod withdrawer;

pub use depositor::{DepositReceipt, Depositor, DepositorError, SimpleDepositor};
pub use purchaser::{PurchaseReceipt, Purchaser, PurchaserError, SimplePurchaser};
pub use withdrawer::{SimpleWithdrawer, WithdrawalReceipt, Withdrawer, WithdrawerError};

use std::sync::Arc;

use reqwest::Url;
use thiserror::Error;
use tokio::task::JoinError;

use crate::{
    model::{Amount, AmountParseError, Catalog, RawAmount, UserId},
    settlement::{SettlementClient, SettlementError},
    store::LedgerStore,
};

/// Entry point of the money movement flows.
///
/// Every flow runs on its own task. A caller that goes away, e.g. a client
/// closing its connection, cannot stop a saga between its phases.
pub struct TransactionOrchestrator {
    depositor: Arc<dyn Depositor + Send + Sync>,
    withdrawer: Arc<dyn Withdrawer + Send + Sync>,
    purchaser: Arc<dyn Purchaser + Send + Sync>,
}

impl TransactionOrchestrator {
    pub fn new(
        store: Arc<LedgerStore>,
        settlement: Arc<dyn SettlementClient + Send + Sync>,
        catalog: Arc<Catalog>,
        frontend_url: &str,
        bank_frontend_url: &Url,
    ) -> Self {
        let depositor = SimpleDepositor::new(
            store.clone(),
            settlement.clone(),
            frontend_url,
            bank_frontend_url,
        );
        let withdrawer = SimpleWithdrawer::new(store.clone(), settlement);
        let purchaser = SimplePurchaser::new(store, catalog);

        Self {
            depositor: Arc::new(depositor),
            withdrawer: Arc::new(withdrawer),
            purchaser: Arc::new(purchaser),
        }
    }

    pub async fn deposit(
        &self,
        user_id: UserId,
        amount: &RawAmount,
    ) -> Result<DepositReceipt, OrchestratorError> {
        let amount = Amount::try_from(amount)?;
        let depositor = Arc::clone(&self.depositor);
        let receipt =
            tokio::spawn(async move { depositor.deposit(user_id, amount).await }).await??;
        Ok(receipt)
    }

    pub async fn withdraw(
        &self,
        user_id: UserId,
        amount: &RawAmount,
    ) -> Result<WithdrawalReceipt, OrchestratorError> {
        let amount = Amount::try_from(amount)?;
        let withdrawer = Arc::clone(&self.withdrawer);
        let receipt =
            tokio::spawn(async move { withdrawer.withdraw(user_id, amount).await }).await??;
        Ok(receipt)
    }

    pub async fn purchase(
        &self,
        user_id: UserId,
        asset_id: &str,
    ) -> Result<PurchaseReceipt, OrchestratorError> {
        let asset_id = asset_id.to_string();
        let purchaser = Arc::clone(&self.purchaser);
        let receipt =
            tokio::spawn(async move { purchaser.purchase(user_id, &asset_id).await }).await??;
        Ok(receipt)
    }
}

/// The flattened outcome of every flow, as seen by callers.
#[derive(Debug, Error, PartialEq, Clone)]
pub enum OrchestratorError {
    #[error("{0}")]
    InvalidAmount(#[from] AmountParseError),
    #[error("Account not found")]
    AccountNotFound,
    #[error("Asset not found")]
    AssetNotFound,
    #[error("Insufficient balance")]
    InsufficientBalance,
    #[error("Asset already purchased")]
    AlreadyPurchased,
    #[error("Bank API did not return a bank token.")]
    MissingBankToken,
    #[error("Unable to register deposit with bank API.")]
    DepositNotRegistered(SettlementError),
    #[error("Bank rejected withdrawal request.")]
    WithdrawalRejected,
    #[error("Unable to complete withdraw")]
    WithdrawalFailed(SettlementError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DepositorError> for OrchestratorError {
    fn from(err: DepositorError) -> Self {
        match err {
            DepositorError::AccountNotFound(_) => Self::AccountNotFound,
            DepositorError::Settlement(SettlementError::MissingToken) => Self::MissingBankToken,
            DepositorError::Settlement(err) => Self::DepositNotRegistered(err),
            DepositorError::Store(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<WithdrawerError> for OrchestratorError {
    fn from(err: WithdrawerError) -> Self {
        match err {
            WithdrawerError::AccountNotFound(_) => Self::AccountNotFound,
            WithdrawerError::InsufficientBalance => Self::InsufficientBalance,
            WithdrawerError::Rejected => Self::WithdrawalRejected,
            WithdrawerError::Settlement(err) => Self::WithdrawalFailed(err),
            WithdrawerError::Store(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<PurchaserError> for OrchestratorError {
    fn from(err: PurchaserError) -> Self {
        match err {
            PurchaserError::AccountNotFound(_) => Self::AccountNotFound,
            PurchaserError::AssetNotFound(_) => Self::AssetNotFound,
            PurchaserError::InsufficientBalance => Self::InsufficientBalance,
            PurchaserError::AlreadyPurchased(_) => Self::AlreadyPurchased,
            PurchaserError::Store(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<JoinError> for OrchestratorError {
    fn from(err: JoinError) -> Self {
        Self::Internal(format!("flow task failed: {err}"))
    }
}
