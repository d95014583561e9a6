use axum::{
    extract::{rejection::JsonRejection, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        StatusCode,
    },
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    model::{
        balance_string, AmountParseError, Balance, RawAmount, Reference, StatementWriter,
        Transaction,
    },
    orchestrator::{DepositReceipt, OrchestratorError, WithdrawalReceipt},
    store::{AccountStore, TransactionLedger},
};

use super::{auth::AuthenticatedUser, ApiError, AppState};

const RECENT_TRANSACTIONS: usize = 20;

#[derive(Debug, Deserialize)]
pub(super) struct AmountRequest {
    #[serde(default)]
    amount: Option<RawAmount>,
}

impl AmountRequest {
    fn amount(&self) -> Result<&RawAmount, ApiError> {
        self.amount
            .as_ref()
            .ok_or_else(|| OrchestratorError::from(AmountParseError::NotAPositiveInteger).into())
    }
}

#[derive(Debug, Serialize)]
pub(super) struct DepositResponse {
    reference: Reference,
    bank_token: String,
    url: String,
}

#[derive(Debug, Serialize)]
pub(super) struct WithdrawResponse {
    ok: bool,
    reference: Reference,
    #[serde(serialize_with = "balance_string::serialize")]
    balance: Balance,
}

#[derive(Debug, Serialize)]
pub(super) struct BalanceResponse {
    #[serde(serialize_with = "balance_string::serialize")]
    balance: Balance,
}

#[derive(Debug, Serialize)]
pub(super) struct TransactionsResponse {
    transactions: Vec<Transaction>,
}

pub(super) async fn deposit(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    payload: Result<Json<AmountRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let DepositReceipt {
        reference,
        bank_token,
        approval_url,
    } = state.orchestrator.deposit(user_id, request.amount()?).await?;
    Ok((
        StatusCode::CREATED,
        Json(DepositResponse {
            reference,
            bank_token,
            url: approval_url,
        }),
    ))
}

pub(super) async fn withdraw(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    payload: Result<Json<AmountRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let WithdrawalReceipt { reference, balance } =
        state.orchestrator.withdraw(user_id, request.amount()?).await?;
    Ok((
        StatusCode::CREATED,
        Json(WithdrawResponse {
            ok: true,
            reference,
            balance,
        }),
    ))
}

pub(super) async fn balance(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.store.balance(user_id).await?;
    Ok(Json(BalanceResponse { balance }))
}

pub(super) async fn transactions(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let account = state.store.account_of(user_id)?;
    let transactions = state
        .store
        .list_recent(account.id, RECENT_TRANSACTIONS)
        .await?;
    Ok(Json(TransactionsResponse { transactions }))
}

/// The full history of the account as CSV.
pub(super) async fn statement(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let account = state.store.account_of(user_id)?;
    let transactions = state.store.list_recent(account.id, usize::MAX).await?;
    let csv = StatementWriter::write(&transactions)?;
    Ok((
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8"),
            (CONTENT_DISPOSITION, "attachment; filename=\"statement.csv\""),
        ],
        csv,
    ))
}
