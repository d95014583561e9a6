use async_trait::async_trait;

use crate::model::{
    AccountId, Amount, Reference, Transaction, TransactionId, TransactionStatus, TransactionType,
};

use super::{LedgerStore, StoreError};

/// Append-only record of money movement attempts and their outcome.
///
/// Like [`AccountStore`](super::AccountStore), these are the single-call
/// forms of the [`UnitOfWork`](super::UnitOfWork) operations, each committed
/// on its own.
#[async_trait]
pub trait TransactionLedger {
    async fn open(
        &self,
        account_id: AccountId,
        amount: Amount,
        kind: TransactionType,
        reference: Reference,
    ) -> Result<Transaction, StoreError>;

    /// Conditional status transition. `Ok(false)` means the transaction was
    /// not in `expected` any more because a concurrent path finalized it.
    async fn finalize(
        &self,
        transaction_id: TransactionId,
        expected: TransactionStatus,
        next: TransactionStatus,
    ) -> Result<bool, StoreError>;

    async fn list_recent(
        &self,
        account_id: AccountId,
        limit: usize,
    ) -> Result<Vec<Transaction>, StoreError>;
}

#[async_trait]
impl TransactionLedger for LedgerStore {
    async fn open(
        &self,
        account_id: AccountId,
        amount: Amount,
        kind: TransactionType,
        reference: Reference,
    ) -> Result<Transaction, StoreError> {
        let mut unit = self.begin(account_id).await?;
        let transaction = unit.open(amount, kind, reference)?;
        unit.commit();
        Ok(transaction)
    }

    async fn finalize(
        &self,
        transaction_id: TransactionId,
        expected: TransactionStatus,
        next: TransactionStatus,
    ) -> Result<bool, StoreError> {
        let account_id = self
            .transaction(transaction_id)
            .ok_or(StoreError::UnknownTransaction(transaction_id))?
            .account_id;
        let mut unit = self.begin(account_id).await?;
        let finalized = unit.finalize(transaction_id, expected, next)?;
        unit.commit();
        Ok(finalized)
    }

    async fn list_recent(
        &self,
        account_id: AccountId,
        limit: usize,
    ) -> Result<Vec<Transaction>, StoreError> {
        Ok(self.begin(account_id).await?.list_recent(limit))
    }
}
