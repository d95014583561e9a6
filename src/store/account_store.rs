use async_trait::async_trait;

use crate::model::{Amount, Balance, UserId};

use super::{LedgerStore, StoreError};

/// One balance per user, mutated only through conditional updates.
///
/// Each method is the single-call form of the matching [`UnitOfWork`]
/// operation: it begins a unit on the user's account, applies the operation
/// and commits. Flows that must combine several operations atomically use a
/// unit directly.
///
/// [`UnitOfWork`]: super::UnitOfWork
#[async_trait]
pub trait AccountStore {
    async fn balance(&self, user_id: UserId) -> Result<Balance, StoreError>;

    /// Decrements the balance only if it covers `amount`. Returning
    /// `Ok(false)` is the insufficient balance outcome, not an error.
    async fn try_debit(&self, user_id: UserId, amount: Amount) -> Result<bool, StoreError>;

    async fn credit(&self, user_id: UserId, amount: Amount) -> Result<Balance, StoreError>;
}

#[async_trait]
impl AccountStore for LedgerStore {
    async fn balance(&self, user_id: UserId) -> Result<Balance, StoreError> {
        self.begin_for_user(user_id).await?.balance()
    }

    async fn try_debit(&self, user_id: UserId, amount: Amount) -> Result<bool, StoreError> {
        let mut unit = self.begin_for_user(user_id).await?;
        let debited = unit.try_debit(amount)?;
        unit.commit();
        Ok(debited)
    }

    async fn credit(&self, user_id: UserId, amount: Amount) -> Result<Balance, StoreError> {
        let mut unit = self.begin_for_user(user_id).await?;
        let balance = unit.credit(amount)?;
        unit.commit();
        Ok(balance)
    }
}
