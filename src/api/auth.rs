use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequestParts, State},
    http::{
        header::{AUTHORIZATION, COOKIE, SET_COOKIE},
        request::Parts,
        HeaderMap, StatusCode,
    },
    response::{AppendHeaders, IntoResponse},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    model::UserId,
    session::{Session, SessionError},
};

use super::{ApiError, AppState};

pub const SESSION_COOKIE: &str = "session_id";

/// The user a request acts for, resolved from the `session_id` cookie or a
/// bearer token. Handlers taking it answer 401 to anonymous callers.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub UserId);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let session_id = session_cookie(&parts.headers)
            .or_else(|| bearer_token(&parts.headers))
            .ok_or(SessionError::Unauthenticated)?;
        Ok(Self(state.sessions.resolve(session_id)?))
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[derive(Debug, Deserialize)]
pub(super) struct EmailRequest {
    email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SessionResponse {
    ok: bool,
    user_id: UserId,
    session_id: String,
}

#[derive(Debug, Serialize)]
pub(super) struct MeResponse {
    user: UserProfile,
}

#[derive(Debug, Serialize)]
pub(super) struct UserProfile {
    id: UserId,
    email: String,
}

/// Registers a user, opens the user's account and starts a session.
pub(super) async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(EmailRequest { email }) = payload?;
    let user_id = state.sessions.register(&email)?;
    if let Err(err) = state.store.open_account(user_id) {
        state.sessions.forget(&email);
        return Err(err.into());
    }
    let session = state.sessions.issue(user_id);
    tracing::info!(%user_id, "User signed up");
    Ok(session_response(StatusCode::CREATED, session))
}

/// Starts a new session for a registered user.
pub(super) async fn login(
    State(state): State<AppState>,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(EmailRequest { email }) = payload?;
    let session = state.sessions.login(&email)?;
    tracing::info!(user_id = %session.user_id, "User logged in");
    Ok(session_response(StatusCode::OK, session))
}

pub(super) async fn me(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<MeResponse>, ApiError> {
    let email = state
        .sessions
        .email_of(user_id)
        .ok_or(SessionError::Unauthenticated)?;
    Ok(Json(MeResponse {
        user: UserProfile { id: user_id, email },
    }))
}

fn session_response(status: StatusCode, session: Session) -> impl IntoResponse {
    let max_age = (session.expires_at - Utc::now()).num_seconds().max(0);
    let cookie = format!(
        "{SESSION_COOKIE}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={max_age}",
        session.id
    );
    (
        status,
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(SessionResponse {
            ok: true,
            user_id: session.user_id,
            session_id: session.id.to_string(),
        }),
    )
}
