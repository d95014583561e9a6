use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    model::{Amount, Balance, Reference, TransactionType, UserId},
    settlement::{SettlementClient, SettlementError},
    store::{LedgerStore, StoreError},
};

use super::saga::{self, Conclusion, PendingDebit};

#[derive(Debug, PartialEq, Clone)]
pub struct WithdrawalReceipt {
    pub reference: Reference,
    /// The balance right after the debit.
    pub balance: Balance,
}

#[derive(Debug, Error, PartialEq, Clone)]
pub enum WithdrawerError {
    #[error("No account found for user {0}")]
    AccountNotFound(UserId),
    #[error("Insufficient balance")]
    InsufficientBalance,
    #[error("The settlement partner rejected the withdrawal")]
    Rejected,
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for WithdrawerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NoAccountForUser(user_id) => Self::AccountNotFound(user_id),
            err => Self::Store(err),
        }
    }
}

#[async_trait]
pub trait Withdrawer {
    async fn withdraw(
        &self,
        user_id: UserId,
        amount: Amount,
    ) -> Result<WithdrawalReceipt, WithdrawerError>;
}

/// Debits first, then asks the partner. Anything but an explicit acceptance
/// credits the debit back.
pub struct SimpleWithdrawer {
    store: Arc<LedgerStore>,
    settlement: Arc<dyn SettlementClient + Send + Sync>,
}

impl SimpleWithdrawer {
    pub fn new(
        store: Arc<LedgerStore>,
        settlement: Arc<dyn SettlementClient + Send + Sync>,
    ) -> Self {
        Self { store, settlement }
    }

    /// Phase one: the debit and the `Pending` transaction, in one unit.
    async fn debit(
        &self,
        user_id: UserId,
        amount: Amount,
    ) -> Result<(PendingDebit, Reference, Balance), WithdrawerError> {
        let mut unit = self.store.begin_for_user(user_id).await?;
        if !unit.try_debit(amount)? {
            return Err(WithdrawerError::InsufficientBalance);
        }
        let transaction = unit.open(
            amount,
            TransactionType::Withdraw,
            Reference::generate(TransactionType::Withdraw),
        )?;
        let balance = unit.balance()?;
        let account_id = unit.account_id();
        unit.commit();

        let step = PendingDebit::new(self.store.clone(), account_id, transaction.id, amount);
        Ok((step, transaction.reference, balance))
    }
}

#[async_trait]
impl Withdrawer for SimpleWithdrawer {
    async fn withdraw(
        &self,
        user_id: UserId,
        amount: Amount,
    ) -> Result<WithdrawalReceipt, WithdrawerError> {
        let (step, reference, balance) = self.debit(user_id, amount).await?;

        let answer = self
            .settlement
            .request_withdrawal(&reference, user_id, amount)
            .await;
        let conclusion = saga::conclude(&step, matches!(answer, Ok(true)))
            .await
            .map_err(|err| {
                tracing::error!(%reference, %amount, %err, "Withdrawal could not be concluded");
                err
            })?;

        match answer {
            Ok(true) => {
                if conclusion == Conclusion::AlreadyFinalized {
                    tracing::warn!(%reference, "Accepted withdrawal was already finalized");
                }
                tracing::info!(%reference, %amount, %balance, "Withdrawal accepted");
                Ok(WithdrawalReceipt { reference, balance })
            }
            Ok(false) => {
                tracing::warn!(%reference, %amount, ?conclusion, "Withdrawal rejected, debit reversed");
                Err(WithdrawerError::Rejected)
            }
            Err(err) => {
                tracing::warn!(%reference, %amount, %err, ?conclusion, "Withdrawal failed, debit reversed");
                Err(err.into())
            }
        }
    }
}
