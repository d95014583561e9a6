use std::fmt;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::{
    model::StatementWriterError,
    orchestrator::OrchestratorError,
    session::SessionError,
    store::StoreError,
    webhook::WebhookError,
};

/// An error on its way to becoming an HTTP response.
///
/// Business errors keep their status and message. Internal errors are logged
/// and answered with a generic body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = if self.status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(message = %self.message, "Internal server error");
            "Internal server error"
        } else {
            if self.status.is_server_error() {
                tracing::warn!(status = %self.status, message = %self.message, "Upstream failure");
            }
            self.message.as_str()
        };
        (self.status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        let status = match &err {
            OrchestratorError::InvalidAmount(_) | OrchestratorError::InsufficientBalance => {
                StatusCode::BAD_REQUEST
            }
            OrchestratorError::AccountNotFound | OrchestratorError::AssetNotFound => {
                StatusCode::NOT_FOUND
            }
            OrchestratorError::AlreadyPurchased => StatusCode::CONFLICT,
            OrchestratorError::MissingBankToken
            | OrchestratorError::DepositNotRegistered(_)
            | OrchestratorError::WithdrawalRejected
            | OrchestratorError::WithdrawalFailed(_) => StatusCode::BAD_GATEWAY,
            OrchestratorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if let OrchestratorError::DepositNotRegistered(cause)
        | OrchestratorError::WithdrawalFailed(cause) = &err
        {
            tracing::warn!(%cause, "Settlement partner call failed");
        }
        Self::new(status, err.to_string())
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::Unauthorized => Self::new(StatusCode::UNAUTHORIZED, err.to_string()),
            WebhookError::UnknownToken(_) => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            WebhookError::Store(err) => Self::internal(err.to_string()),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let status = match err {
            SessionError::Unauthenticated | SessionError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            SessionError::InvalidEmail => StatusCode::BAD_REQUEST,
            SessionError::EmailTaken => StatusCode::CONFLICT,
        };
        Self::new(status, err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NoAccountForUser(_) => Self::new(StatusCode::NOT_FOUND, "Account not found"),
            err => Self::internal(err.to_string()),
        }
    }
}

impl From<StatementWriterError> for ApiError {
    fn from(err: StatementWriterError) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}
