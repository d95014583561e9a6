use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    model::{AccountId, Amount, TransactionId, TransactionStatus},
    store::{LedgerStore, StoreError},
};

/// The second half of a two-phase saga.
///
/// Phase one has already committed a local effect. Once the remote party has
/// answered, the step is either confirmed or compensated. Both are
/// conditional: they return `Ok(false)` when some other path already
/// finalized the effect, and then change nothing.
#[async_trait]
pub trait CompensableStep {
    type Error: Send;

    async fn confirm(&self) -> Result<bool, Self::Error>;

    async fn compensate(&self) -> Result<bool, Self::Error>;
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Conclusion {
    Confirmed,
    Compensated,
    AlreadyFinalized,
}

/// Confirms the step if the remote party accepted it, compensates it
/// otherwise. A timeout or a transport error counts as not accepted.
pub async fn conclude<S>(step: &S, accepted: bool) -> Result<Conclusion, S::Error>
where
    S: CompensableStep + Sync + ?Sized,
{
    let conclusion = if accepted {
        match step.confirm().await? {
            true => Conclusion::Confirmed,
            false => Conclusion::AlreadyFinalized,
        }
    } else {
        match step.compensate().await? {
            true => Conclusion::Compensated,
            false => Conclusion::AlreadyFinalized,
        }
    };
    Ok(conclusion)
}

/// A debit that was committed together with a `Pending` transaction and
/// waits for the settlement partner.
#[derive(Clone)]
pub struct PendingDebit {
    store: Arc<LedgerStore>,
    account_id: AccountId,
    transaction_id: TransactionId,
    amount: Amount,
}

impl PendingDebit {
    pub fn new(
        store: Arc<LedgerStore>,
        account_id: AccountId,
        transaction_id: TransactionId,
        amount: Amount,
    ) -> Self {
        Self {
            store,
            account_id,
            transaction_id,
            amount,
        }
    }
}

#[async_trait]
impl CompensableStep for PendingDebit {
    type Error = StoreError;

    async fn confirm(&self) -> Result<bool, StoreError> {
        let mut unit = self.store.begin(self.account_id).await?;
        let confirmed = unit.finalize(
            self.transaction_id,
            TransactionStatus::Pending,
            TransactionStatus::Success,
        )?;
        unit.commit();
        Ok(confirmed)
    }

    /// The credit back only happens in the unit that won the transition to
    /// `Failed`.
    async fn compensate(&self) -> Result<bool, StoreError> {
        let mut unit = self.store.begin(self.account_id).await?;
        if !unit.finalize(
            self.transaction_id,
            TransactionStatus::Pending,
            TransactionStatus::Failed,
        )? {
            return Ok(false);
        }
        unit.credit(self.amount)?;
        unit.commit();
        Ok(true)
    }
}
