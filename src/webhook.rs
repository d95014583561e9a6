use std::sync::Arc;

use constant_time_eq::constant_time_eq;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    model::{BankToken, TransactionStatus},
    store::{LedgerStore, StoreError},
};

/// The final state reported by the settlement partner for a deposit order.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Success,
    Failed,
}

impl From<SettlementStatus> for TransactionStatus {
    fn from(status: SettlementStatus) -> Self {
        match status {
            SettlementStatus::Success => TransactionStatus::Success,
            SettlementStatus::Failed => TransactionStatus::Failed,
        }
    }
}

/// A settlement callback, as delivered by the partner.
#[derive(Debug, PartialEq, Clone)]
pub struct SettlementNotice {
    pub bank_token: BankToken,
    pub status: SettlementStatus,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum WebhookOutcome {
    /// This delivery moved the deposit out of `Pending`.
    Settled,
    /// A previous delivery already did. Nothing was changed.
    AlreadySettled,
}

#[derive(Debug, Error, PartialEq, Clone)]
pub enum WebhookError {
    #[error("Invalid webhook signature")]
    Unauthorized,
    #[error("Unknown bank token")]
    UnknownToken(BankToken),
    #[error("Failed to apply the settlement: {0}")]
    Store(#[from] StoreError),
}

/// Applies asynchronous settlement callbacks to pending deposits.
///
/// Webhooks may arrive late, twice, or concurrently. Replays are absorbed by
/// the conditional `Pending` transition, which runs in the same unit of work
/// as the credit and the `settled_at` stamp.
pub struct WebhookHandler {
    store: Arc<LedgerStore>,
    secret: Option<String>,
}

impl WebhookHandler {
    pub fn new(store: Arc<LedgerStore>, secret: Option<String>) -> Self {
        Self { store, secret }
    }

    pub async fn handle(
        &self,
        presented_secret: Option<&str>,
        notice: SettlementNotice,
    ) -> Result<WebhookOutcome, WebhookError> {
        self.authenticate(presented_secret)?;

        let SettlementNotice { bank_token, status } = notice;
        let processing = self
            .store
            .processing(&bank_token)
            .ok_or_else(|| WebhookError::UnknownToken(bank_token.clone()))?;
        let account_id = self
            .store
            .transaction(processing.transaction_id)
            .ok_or_else(|| WebhookError::UnknownToken(bank_token.clone()))?
            .account_id;

        let mut unit = self.store.begin(account_id).await?;
        let transaction = match unit.transaction(processing.transaction_id) {
            Ok(transaction) => transaction,
            // Its creating unit was rolled back after we looked it up.
            Err(StoreError::UnknownTransaction(_)) => {
                return Err(WebhookError::UnknownToken(bank_token))
            }
            Err(err) => return Err(err.into()),
        };
        if transaction.status.is_terminal()
            || !unit.finalize(transaction.id, TransactionStatus::Pending, status.into())?
        {
            tracing::info!(
                %bank_token,
                reference = %transaction.reference,
                status = ?transaction.status,
                "Webhook replay ignored"
            );
            return Ok(WebhookOutcome::AlreadySettled);
        }
        if status == SettlementStatus::Success {
            unit.credit(transaction.amount)?;
        }
        unit.mark_settled(&bank_token)?;
        unit.commit();

        tracing::info!(
            %bank_token,
            reference = %transaction.reference,
            amount = %transaction.amount,
            ?status,
            "Deposit settled"
        );
        Ok(WebhookOutcome::Settled)
    }

    /// Checks the shared secret, if one is configured.
    pub fn authenticate(&self, presented: Option<&str>) -> Result<(), WebhookError> {
        match &self.secret {
            None => Ok(()),
            Some(expected) => match presented {
                Some(presented)
                    if constant_time_eq(expected.as_bytes(), presented.as_bytes()) =>
                {
                    Ok(())
                }
                _ => {
                    tracing::warn!("Webhook rejected: missing or mismatched secret");
                    Err(WebhookError::Unauthorized)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use rstest::rstest;
    use uuid::Uuid;

    use crate::{
        model::{
            Account, Amount, Reference,
            TransactionStatus::{self, Failed, Success},
            TransactionType,
        },
        store::{AccountStore, LedgerStore},
    };

    use super::{
        SettlementNotice, SettlementStatus, WebhookError, WebhookHandler, WebhookOutcome,
    };

    const TOKEN: &str = "bank_session_0123";

    #[rstest]
    //     status,                     balance after, transaction status
    #[case(SettlementStatus::Success,            500, Success)]
    #[case(SettlementStatus::Failed,               0, Failed)]
    #[tokio::test]
    async fn settles_a_pending_deposit(
        #[case] status: SettlementStatus,
        #[case] expected_balance: u128,
        #[case] expected_status: TransactionStatus,
    ) {
        let (store, account, transaction_id) = pending_deposit(500).await;
        let handler = WebhookHandler::new(store.clone(), None);

        assert_eq!(
            handler.handle(None, notice(TOKEN, status)).await,
            Ok(WebhookOutcome::Settled)
        );
        assert_eq!(store.balance(account.user_id).await.unwrap(), expected_balance);
        assert_eq!(
            store.transaction(transaction_id).unwrap().status,
            expected_status
        );
        assert!(store.processing(TOKEN).unwrap().settled_at.is_some());
    }

    #[rstest]
    #[case(SettlementStatus::Success, SettlementStatus::Success)]
    #[case(SettlementStatus::Success, SettlementStatus::Failed)]
    #[case(SettlementStatus::Failed,  SettlementStatus::Success)]
    #[tokio::test]
    async fn replays_are_acknowledged_without_effect(
        #[case] first: SettlementStatus,
        #[case] replay: SettlementStatus,
    ) {
        let (store, account, _) = pending_deposit(500).await;
        let handler = WebhookHandler::new(store.clone(), None);

        handler.handle(None, notice(TOKEN, first)).await.unwrap();
        let balance = store.balance(account.user_id).await.unwrap();
        let settled_at = store.processing(TOKEN).unwrap().settled_at;

        assert_eq!(
            handler.handle(None, notice(TOKEN, replay)).await,
            Ok(WebhookOutcome::AlreadySettled)
        );
        assert_eq!(store.balance(account.user_id).await.unwrap(), balance);
        assert_eq!(store.processing(TOKEN).unwrap().settled_at, settled_at);
    }

    #[tokio::test]
    async fn concurrent_deliveries_credit_exactly_once() {
        let (store, account, _) = pending_deposit(500).await;
        let handler = Arc::new(WebhookHandler::new(store.clone(), None));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let handler = handler.clone();
                tokio::spawn(async move {
                    handler
                        .handle(None, notice(TOKEN, SettlementStatus::Success))
                        .await
                        .unwrap()
                })
            })
            .collect();
        let mut settled = 0;
        for handle in handles {
            if handle.await.unwrap() == WebhookOutcome::Settled {
                settled += 1;
            }
        }

        assert_eq!(settled, 1);
        assert_eq!(store.balance(account.user_id).await.unwrap(), 500);
    }

    #[tokio::test]
    async fn unknown_tokens_are_not_found() {
        let (store, _, _) = pending_deposit(500).await;
        let handler = WebhookHandler::new(store, None);
        assert_eq!(
            handler
                .handle(None, notice("nope", SettlementStatus::Success))
                .await,
            Err(WebhookError::UnknownToken("nope".to_string()))
        );
    }

    #[rstest]
    #[case(None)]
    #[case(Some("wrong"))]
    #[case(Some("s3cret-but-longer"))]
    #[case(Some("s3creT"))]
    #[case(Some(""))]
    #[tokio::test]
    async fn a_configured_secret_must_be_presented(#[case] presented: Option<&str>) {
        let (store, account, _) = pending_deposit(500).await;
        let handler = WebhookHandler::new(store.clone(), Some("s3cret".to_string()));

        assert_matches!(
            handler
                .handle(presented, notice(TOKEN, SettlementStatus::Success))
                .await,
            Err(WebhookError::Unauthorized)
        );
        assert_eq!(store.balance(account.user_id).await.unwrap(), 0);

        assert_eq!(
            handler
                .handle(Some("s3cret"), notice(TOKEN, SettlementStatus::Success))
                .await,
            Ok(WebhookOutcome::Settled)
        );
    }

    async fn pending_deposit(amount: u128) -> (Arc<LedgerStore>, Account, Uuid) {
        let store = Arc::new(LedgerStore::new());
        let account = store.open_account(Uuid::new_v4()).unwrap();
        let mut unit = store.begin(account.id).await.unwrap();
        let transaction = unit
            .open(
                Amount::new(amount).unwrap(),
                TransactionType::Deposit,
                Reference::generate(TransactionType::Deposit),
            )
            .unwrap();
        unit.attach_processing(transaction.id, TOKEN.to_string())
            .unwrap();
        unit.commit();
        (store, account, transaction.id)
    }

    fn notice(token: &str, status: SettlementStatus) -> SettlementNotice {
        SettlementNotice {
            bank_token: token.to_string(),
            status,
        }
    }
}
