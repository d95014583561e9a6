use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::webhook::{SettlementNotice, SettlementStatus, WebhookOutcome};

use super::{ApiError, AppState};

pub const SECRET_HEADER: &str = "x-bank-webhook-secret";

/// The partner's callback body. Status is matched case-insensitively.
#[derive(Debug, Deserialize)]
pub(super) struct WebhookPayload {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(super) struct WebhookResponse {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    settled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    already_settled: Option<bool>,
}

impl WebhookPayload {
    fn into_notice(self) -> Option<SettlementNotice> {
        let bank_token = self.token.filter(|token| !token.is_empty())?;
        let status = match self.status?.to_uppercase().as_str() {
            "SUCCESS" => SettlementStatus::Success,
            "FAILED" => SettlementStatus::Failed,
            _ => return None,
        };
        Some(SettlementNotice { bank_token, status })
    }
}

pub(super) async fn settle(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<WebhookPayload>, JsonRejection>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let secret = headers
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok());
    state.webhooks.authenticate(secret)?;

    let notice = payload
        .ok()
        .and_then(|Json(payload)| payload.into_notice())
        .ok_or_else(|| ApiError::bad_request("Invalid webhook payload"))?;
    let response = match state.webhooks.handle(secret, notice).await? {
        WebhookOutcome::Settled => WebhookResponse {
            ok: true,
            settled: Some(true),
            already_settled: None,
        },
        WebhookOutcome::AlreadySettled => WebhookResponse {
            ok: true,
            settled: None,
            already_settled: Some(true),
        },
    };
    Ok(Json(response))
}
