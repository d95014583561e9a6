mod amount;
mod catalog;
mod reference;
mod statement;

pub use amount::{Amount, AmountParseError, RawAmount};
pub use catalog::{Asset, Catalog};
pub use reference::Reference;
pub use statement::{StatementWriter, StatementWriterError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;
pub type AccountId = Uuid;
pub type TransactionId = Uuid;
pub type PurchaseId = Uuid;
pub type AssetId = String;
pub type BankToken = String;

/// Balances may legitimately be zero, unlike an [`Amount`].
pub type Balance = u128;

/// One balance per user.
#[derive(Debug, PartialEq, Clone)]
pub struct Account {
    pub id: AccountId,
    pub user_id: UserId,
    pub balance: Balance,
}

impl Account {
    pub(crate) fn empty(user_id: UserId) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            balance: 0,
        }
    }
}

/// The kinds of money movement recorded by the ledger.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdraw,
    TransferOut,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// This is the initial state of every deposit and withdrawal.
    Pending,

    /// Terminal. The balance effect of the transaction has been applied.
    Success,

    /// Terminal. The transaction has no balance effect, any provisional
    /// debit has been credited back.
    Failed,
}

impl TransactionStatus {
    /// Only `Pending` can move, and only to a terminal status.
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        self == TransactionStatus::Pending && next != TransactionStatus::Pending
    }

    pub fn is_terminal(self) -> bool {
        self != TransactionStatus::Pending
    }
}

/// A money movement attempt.
#[derive(Debug, PartialEq, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub amount: Amount,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub reference: Reference,
    pub created_at: DateTime<Utc>,
}

/// Links a bank token issued by the settlement partner to a deposit.
///
/// `settled_at` is stamped once, by the first webhook that moves the linked
/// transaction out of `Pending`.
#[derive(Debug, PartialEq, Clone)]
pub struct ProcessingRecord {
    pub bank_token: BankToken,
    pub transaction_id: TransactionId,
    pub settled_at: Option<DateTime<Utc>>,
}

/// A completed catalog spend, paid for by a `TransferOut` transaction.
#[derive(Debug, PartialEq, Clone)]
pub struct AssetPurchase {
    pub id: PurchaseId,
    pub user_id: UserId,
    pub asset_id: AssetId,
    pub asset_name: String,
    pub price: Amount,
    pub transaction_id: TransactionId,
    pub created_at: DateTime<Utc>,
}

/// Serializes a [`Balance`] as a decimal string.
pub mod balance_string {
    use serde::Serializer;

    use super::Balance;

    pub fn serialize<S: Serializer>(balance: &Balance, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(balance)
    }
}
