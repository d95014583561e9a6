use std::fmt;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::model::{
    AccountId, Amount, Asset, AssetPurchase, Balance, BankToken, ProcessingRecord, Reference,
    Transaction, TransactionId, TransactionStatus, TransactionType, UserId,
};

use super::{LedgerEntry, LedgerStore, StoreError};

/// An atomic, isolated unit of work against one account.
///
/// Every mutation is journaled. [`UnitOfWork::commit`] keeps the mutations;
/// dropping the unit without committing replays the journal backwards, which
/// also covers early returns through `?`, panics and cancelled tasks.
pub struct UnitOfWork<'a> {
    store: &'a LedgerStore,
    account_id: AccountId,
    journal: Vec<Undo>,
    committed: bool,
    _guard: OwnedMutexGuard<()>,
}

#[derive(Debug)]
enum Undo {
    Balance(Balance),
    Inserted(TransactionId, Reference),
    Status(TransactionId, TransactionStatus),
    Linked(BankToken, TransactionId),
    Settled(BankToken),
    Purchased(UserId, String),
}

impl<'a> UnitOfWork<'a> {
    pub(super) fn new(
        store: &'a LedgerStore,
        account_id: AccountId,
        guard: OwnedMutexGuard<()>,
    ) -> Self {
        Self {
            store,
            account_id,
            journal: Vec::new(),
            committed: false,
            _guard: guard,
        }
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn balance(&self) -> Result<Balance, StoreError> {
        self.store
            .accounts
            .get(&self.account_id)
            .map(|account| account.balance)
            .ok_or(StoreError::UnknownAccount(self.account_id))
    }

    /// Decrements the balance only if it covers `amount`. `Ok(false)` means
    /// insufficient balance and nothing was changed.
    pub fn try_debit(&mut self, amount: Amount) -> Result<bool, StoreError> {
        let mut account = self
            .store
            .accounts
            .get_mut(&self.account_id)
            .ok_or(StoreError::UnknownAccount(self.account_id))?;
        let previous = account.balance;
        if previous < amount.value() {
            return Ok(false);
        }
        account.balance = previous - amount.value();
        drop(account);
        self.journal.push(Undo::Balance(previous));
        Ok(true)
    }

    pub fn credit(&mut self, amount: Amount) -> Result<Balance, StoreError> {
        let mut account = self
            .store
            .accounts
            .get_mut(&self.account_id)
            .ok_or(StoreError::UnknownAccount(self.account_id))?;
        let previous = account.balance;
        let balance = previous
            .checked_add(amount.value())
            .ok_or(StoreError::BalanceOverflow(self.account_id))?;
        account.balance = balance;
        drop(account);
        self.journal.push(Undo::Balance(previous));
        Ok(balance)
    }

    /// Appends a `Pending` transaction.
    pub fn open(
        &mut self,
        amount: Amount,
        kind: TransactionType,
        reference: Reference,
    ) -> Result<Transaction, StoreError> {
        self.record(amount, kind, reference, TransactionStatus::Pending)
    }

    /// Appends a transaction in the given status. Used directly only for
    /// movements that complete inside a single unit.
    pub fn record(
        &mut self,
        amount: Amount,
        kind: TransactionType,
        reference: Reference,
        status: TransactionStatus,
    ) -> Result<Transaction, StoreError> {
        let id = Uuid::new_v4();
        match self.store.references.entry(reference.clone()) {
            Entry::Occupied(_) => {
                return Err(StoreError::Conflict(format!(
                    "reference {reference} already exists"
                )))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(id);
            }
        }
        let transaction = Transaction {
            id,
            account_id: self.account_id,
            amount,
            kind,
            status,
            reference: reference.clone(),
            created_at: Utc::now(),
        };
        self.store.transactions.insert(
            id,
            LedgerEntry {
                sequence: self.store.next_sequence(),
                transaction: transaction.clone(),
            },
        );
        self.journal.push(Undo::Inserted(id, reference));
        Ok(transaction)
    }

    pub fn transaction(&self, transaction_id: TransactionId) -> Result<Transaction, StoreError> {
        let entry = self
            .store
            .transactions
            .get(&transaction_id)
            .ok_or(StoreError::UnknownTransaction(transaction_id))?;
        if entry.transaction.account_id != self.account_id {
            return Err(StoreError::ForeignTransaction(transaction_id));
        }
        Ok(entry.transaction.clone())
    }

    /// Moves a transaction from `expected` to `next`. `Ok(false)` means the
    /// transaction was no longer in `expected`, i.e. some other path already
    /// finalized it.
    pub fn finalize(
        &mut self,
        transaction_id: TransactionId,
        expected: TransactionStatus,
        next: TransactionStatus,
    ) -> Result<bool, StoreError> {
        if !expected.can_transition_to(next) {
            return Err(StoreError::IllegalTransition {
                from: expected,
                to: next,
            });
        }
        let mut entry = self
            .store
            .transactions
            .get_mut(&transaction_id)
            .ok_or(StoreError::UnknownTransaction(transaction_id))?;
        if entry.transaction.account_id != self.account_id {
            return Err(StoreError::ForeignTransaction(transaction_id));
        }
        if entry.transaction.status != expected {
            return Ok(false);
        }
        entry.transaction.status = next;
        drop(entry);
        self.journal.push(Undo::Status(transaction_id, expected));
        Ok(true)
    }

    /// Links a bank token to a deposit, one-to-one.
    pub fn attach_processing(
        &mut self,
        transaction_id: TransactionId,
        bank_token: BankToken,
    ) -> Result<ProcessingRecord, StoreError> {
        if self.transaction(transaction_id)?.kind != TransactionType::Deposit {
            return Err(StoreError::NotADeposit(transaction_id));
        }
        match self.store.tokens_by_transaction.entry(transaction_id) {
            Entry::Occupied(_) => {
                return Err(StoreError::Conflict(format!(
                    "transaction {transaction_id} already has a bank token"
                )))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(bank_token.clone());
            }
        }
        let record = ProcessingRecord {
            bank_token: bank_token.clone(),
            transaction_id,
            settled_at: None,
        };
        match self.store.processing.entry(bank_token.clone()) {
            Entry::Occupied(_) => {
                self.store.tokens_by_transaction.remove(&transaction_id);
                return Err(StoreError::Conflict(format!(
                    "bank token {bank_token} already exists"
                )));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record.clone());
            }
        }
        self.journal.push(Undo::Linked(bank_token, transaction_id));
        Ok(record)
    }

    /// Stamps `settled_at` on the first call; later calls leave it alone and
    /// return `Ok(false)`.
    pub fn mark_settled(&mut self, bank_token: &str) -> Result<bool, StoreError> {
        let mut record = self
            .store
            .processing
            .get_mut(bank_token)
            .ok_or_else(|| StoreError::UnknownBankToken(bank_token.to_string()))?;
        let transaction_id = record.transaction_id;
        if record.settled_at.is_some() {
            return Ok(false);
        }
        drop(record);
        // Ownership check after releasing the shard lock of `processing`.
        self.transaction(transaction_id)?;
        if let Some(mut record) = self.store.processing.get_mut(bank_token) {
            record.settled_at = Some(Utc::now());
        }
        self.journal.push(Undo::Settled(bank_token.to_string()));
        Ok(true)
    }

    /// Records a catalog purchase for the owner of this account. A second
    /// purchase of the same asset is a `Conflict`.
    pub fn record_purchase(
        &mut self,
        asset: &Asset,
        transaction_id: TransactionId,
    ) -> Result<AssetPurchase, StoreError> {
        let user_id = self
            .store
            .accounts
            .get(&self.account_id)
            .map(|account| account.user_id)
            .ok_or(StoreError::UnknownAccount(self.account_id))?;
        self.transaction(transaction_id)?;
        let purchase = AssetPurchase {
            id: Uuid::new_v4(),
            user_id,
            asset_id: asset.id.clone(),
            asset_name: asset.name.clone(),
            price: asset.price,
            transaction_id,
            created_at: Utc::now(),
        };
        match self.store.purchases.entry((user_id, asset.id.clone())) {
            Entry::Occupied(_) => {
                return Err(StoreError::Conflict(format!(
                    "asset {} already purchased by user {user_id}",
                    asset.id
                )))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(purchase.clone());
            }
        }
        self.journal.push(Undo::Purchased(user_id, asset.id.clone()));
        Ok(purchase)
    }

    /// Transactions of this account, newest first.
    pub fn list_recent(&self, limit: usize) -> Vec<Transaction> {
        let mut entries: Vec<LedgerEntry> = self
            .store
            .transactions
            .iter()
            .filter(|entry| entry.transaction.account_id == self.account_id)
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by(|a, b| {
            b.transaction
                .created_at
                .cmp(&a.transaction.created_at)
                .then(b.sequence.cmp(&a.sequence))
        });
        entries
            .into_iter()
            .take(limit)
            .map(|entry| entry.transaction)
            .collect()
    }

    pub fn commit(mut self) {
        self.committed = true;
    }

    fn rollback(&mut self) {
        while let Some(undo) = self.journal.pop() {
            match undo {
                Undo::Balance(previous) => {
                    if let Some(mut account) = self.store.accounts.get_mut(&self.account_id) {
                        account.balance = previous;
                    }
                }
                Undo::Inserted(transaction_id, reference) => {
                    self.store.transactions.remove(&transaction_id);
                    self.store.references.remove(&reference);
                }
                Undo::Status(transaction_id, previous) => {
                    if let Some(mut entry) = self.store.transactions.get_mut(&transaction_id) {
                        entry.transaction.status = previous;
                    }
                }
                Undo::Linked(bank_token, transaction_id) => {
                    self.store.processing.remove(&bank_token);
                    self.store.tokens_by_transaction.remove(&transaction_id);
                }
                Undo::Settled(bank_token) => {
                    if let Some(mut record) = self.store.processing.get_mut(&bank_token) {
                        record.settled_at = None;
                    }
                }
                Undo::Purchased(user_id, asset_id) => {
                    self.store.purchases.remove(&(user_id, asset_id));
                }
            }
        }
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        if self.committed || self.journal.is_empty() {
            return;
        }
        tracing::debug!(
            account_id = %self.account_id,
            steps = self.journal.len(),
            "Rolling back uncommitted unit of work"
        );
        self.rollback();
    }
}

impl fmt::Debug for UnitOfWork<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("account_id", &self.account_id)
            .field("journal", &self.journal)
            .field("committed", &self.committed)
            .finish()
    }
}
