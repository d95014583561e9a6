use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use thiserror::Error;

use crate::{
    model::{AccountId, Amount, BankToken, Reference, TransactionType, UserId},
    settlement::{SettlementClient, SettlementError},
    store::{LedgerStore, StoreError},
};

#[derive(Debug, PartialEq, Clone)]
pub struct DepositReceipt {
    pub reference: Reference,
    pub bank_token: BankToken,
    /// Where the user approves the payment on the partner's side.
    pub approval_url: String,
}

#[derive(Debug, Error, PartialEq, Clone)]
pub enum DepositorError {
    #[error("No account found for user {0}")]
    AccountNotFound(UserId),
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for DepositorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NoAccountForUser(user_id) => Self::AccountNotFound(user_id),
            err => Self::Store(err),
        }
    }
}

#[async_trait]
pub trait Depositor {
    async fn deposit(&self, user_id: UserId, amount: Amount)
        -> Result<DepositReceipt, DepositorError>;
}

/// Opens the partner order first and records the pending deposit only once
/// the partner has handed out a bank token, so that no reference is ever
/// shown for an order that does not exist downstream.
pub struct SimpleDepositor {
    store: Arc<LedgerStore>,
    settlement: Arc<dyn SettlementClient + Send + Sync>,
    return_url: String,
    approval_endpoint: Url,
}

impl SimpleDepositor {
    pub fn new(
        store: Arc<LedgerStore>,
        settlement: Arc<dyn SettlementClient + Send + Sync>,
        frontend_url: &str,
        bank_frontend_url: &Url,
    ) -> Self {
        let mut approval_endpoint = bank_frontend_url.clone();
        let path = format!(
            "{}/bank/approve",
            approval_endpoint.path().trim_end_matches('/')
        );
        approval_endpoint.set_path(&path);
        Self {
            store,
            settlement,
            return_url: format!("{}/me", frontend_url.trim_end_matches('/')),
            approval_endpoint,
        }
    }

    async fn record_pending(
        &self,
        account_id: AccountId,
        amount: Amount,
        reference: Reference,
        bank_token: BankToken,
    ) -> Result<(), StoreError> {
        let mut unit = self.store.begin(account_id).await?;
        let transaction = unit.open(amount, TransactionType::Deposit, reference)?;
        unit.attach_processing(transaction.id, bank_token)?;
        unit.commit();
        Ok(())
    }

    fn approval_url(&self, bank_token: &str) -> String {
        let mut url = self.approval_endpoint.clone();
        url.query_pairs_mut().append_pair("token", bank_token);
        url.to_string()
    }
}

#[async_trait]
impl Depositor for SimpleDepositor {
    async fn deposit(
        &self,
        user_id: UserId,
        amount: Amount,
    ) -> Result<DepositReceipt, DepositorError> {
        let account = self.store.account_of(user_id)?;
        let reference = Reference::generate(TransactionType::Deposit);

        let bank_token = self
            .settlement
            .create_deposit_order(&reference, amount, &self.return_url)
            .await
            .map_err(|err| {
                tracing::warn!(%reference, %amount, %err, "Deposit order was not created");
                err
            })?;

        self.record_pending(account.id, amount, reference.clone(), bank_token.clone())
            .await
            .map_err(|err| {
                tracing::error!(
                    %reference,
                    %bank_token,
                    %err,
                    "Partner order exists but the pending deposit was not recorded"
                );
                err
            })?;

        tracing::info!(
            %reference,
            %bank_token,
            account_id = %account.id,
            %amount,
            "Deposit pending approval"
        );
        Ok(DepositReceipt {
            approval_url: self.approval_url(&bank_token),
            reference,
            bank_token,
        })
    }
}
