pub mod account_store;
pub mod transaction_ledger;
mod unit_of_work;

pub use account_store::AccountStore;
pub use transaction_ledger::TransactionLedger;
pub use unit_of_work::UnitOfWork;

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use dashmap::{mapref::entry::Entry, DashMap};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::model::{
    Account, AccountId, AssetId, AssetPurchase, BankToken, ProcessingRecord, Reference,
    Transaction, TransactionId, TransactionStatus, UserId,
};

/// The single shared mutable resource of the service.
///
/// Every mutation goes through a [`UnitOfWork`], which holds the lock of one
/// account for its whole lifetime. Two operations on the same account are
/// therefore serialized, while operations on different accounts proceed in
/// parallel. Uniqueness constraints (references, bank tokens, purchases) are
/// global and enforced atomically by the owning map's entry API.
#[derive(Default)]
pub struct LedgerStore {
    accounts: DashMap<AccountId, Account>,
    accounts_by_user: DashMap<UserId, AccountId>,
    transactions: DashMap<TransactionId, LedgerEntry>,
    references: DashMap<Reference, TransactionId>,
    processing: DashMap<BankToken, ProcessingRecord>,
    tokens_by_transaction: DashMap<TransactionId, BankToken>,
    purchases: DashMap<(UserId, AssetId), AssetPurchase>,
    account_locks: DashMap<AccountId, Arc<Mutex<()>>>,
    sequence: AtomicU64,
}

/// A transaction together with its insertion order, used to break ties
/// between equal creation timestamps.
#[derive(Debug, Clone)]
struct LedgerEntry {
    sequence: u64,
    transaction: Transaction,
}

#[derive(Debug, Error, PartialEq, Clone)]
pub enum StoreError {
    #[error("Account not found: {0}")]
    UnknownAccount(AccountId),
    #[error("No account found for user {0}")]
    NoAccountForUser(UserId),
    #[error("Transaction not found: {0}")]
    UnknownTransaction(TransactionId),
    #[error("Transaction {0} does not belong to the account of this unit of work")]
    ForeignTransaction(TransactionId),
    #[error("Bank token not found: {0}")]
    UnknownBankToken(BankToken),
    #[error("Only deposits can be linked to a bank token: {0}")]
    NotADeposit(TransactionId),
    #[error("Illegal status transition from {from:?} to {to:?}")]
    IllegalTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },
    #[error("Crediting account {0} would overflow its balance")]
    BalanceOverflow(AccountId),
    #[error("Unique constraint violated: {0}")]
    Conflict(String),
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the account of a newly registered user, with a zero balance.
    pub fn open_account(&self, user_id: UserId) -> Result<Account, StoreError> {
        match self.accounts_by_user.entry(user_id) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "user {user_id} already has an account"
            ))),
            Entry::Vacant(vacant) => {
                let account = Account::empty(user_id);
                self.accounts.insert(account.id, account.clone());
                vacant.insert(account.id);
                Ok(account)
            }
        }
    }

    pub fn account_of(&self, user_id: UserId) -> Result<Account, StoreError> {
        let account_id = *self
            .accounts_by_user
            .get(&user_id)
            .ok_or(StoreError::NoAccountForUser(user_id))?;
        self.accounts
            .get(&account_id)
            .map(|account| account.value().clone())
            .ok_or(StoreError::UnknownAccount(account_id))
    }

    /// Starts an atomic unit scoped to one account, waiting for any unit
    /// already running against it.
    pub async fn begin(&self, account_id: AccountId) -> Result<UnitOfWork<'_>, StoreError> {
        if !self.accounts.contains_key(&account_id) {
            return Err(StoreError::UnknownAccount(account_id));
        }
        let lock = Arc::clone(&self.account_locks.entry(account_id).or_default());
        let guard = lock.lock_owned().await;
        Ok(UnitOfWork::new(self, account_id, guard))
    }

    pub async fn begin_for_user(&self, user_id: UserId) -> Result<UnitOfWork<'_>, StoreError> {
        let account = self.account_of(user_id)?;
        self.begin(account.id).await
    }

    pub fn processing(&self, bank_token: &str) -> Option<ProcessingRecord> {
        self.processing
            .get(bank_token)
            .map(|record| record.value().clone())
    }

    pub fn transaction(&self, transaction_id: TransactionId) -> Option<Transaction> {
        self.transactions
            .get(&transaction_id)
            .map(|entry| entry.transaction.clone())
    }

    /// The purchases of a user, newest first. Ties are broken by the
    /// insertion order of the paying transactions.
    pub fn purchases_of(&self, user_id: UserId) -> Vec<AssetPurchase> {
        let mut purchases: Vec<(u64, AssetPurchase)> = self
            .purchases
            .iter()
            .filter(|entry| entry.key().0 == user_id)
            .map(|entry| {
                let purchase = entry.value().clone();
                let sequence = self
                    .transactions
                    .get(&purchase.transaction_id)
                    .map_or(0, |ledger_entry| ledger_entry.sequence);
                (sequence, purchase)
            })
            .collect();
        purchases.sort_by(|(a_seq, a), (b_seq, b)| {
            b.created_at.cmp(&a.created_at).then(b_seq.cmp(a_seq))
        });
        purchases.into_iter().map(|(_, purchase)| purchase).collect()
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }
}
