use chrono::{DateTime, Duration, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use thiserror::Error;
use uuid::Uuid;

use crate::model::UserId;

pub type SessionId = Uuid;

#[derive(Debug, PartialEq, Clone)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Clone)]
pub enum SessionError {
    #[error("Unauthorized")]
    Unauthenticated,
    #[error("A valid email is required")]
    InvalidEmail,
    #[error("Email already registered")]
    EmailTaken,
    #[error("Invalid credentials")]
    InvalidCredentials,
}

/// In-memory user directory and session table.
///
/// Only the identity a request acts for is resolved here; credentials are
/// not part of this service.
pub struct SessionStore {
    users_by_email: DashMap<String, UserId>,
    emails_by_user: DashMap<UserId, String>,
    sessions: DashMap<SessionId, Session>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            users_by_email: DashMap::new(),
            emails_by_user: DashMap::new(),
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Registers a user under a normalized email address.
    pub fn register(&self, email: &str) -> Result<UserId, SessionError> {
        let email = normalize(email);
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => return Err(SessionError::InvalidEmail),
        }
        match self.users_by_email.entry(email.clone()) {
            Entry::Occupied(_) => Err(SessionError::EmailTaken),
            Entry::Vacant(vacant) => {
                let user_id = Uuid::new_v4();
                vacant.insert(user_id);
                self.emails_by_user.insert(user_id, email);
                Ok(user_id)
            }
        }
    }

    /// Drops a registration whose account could not be opened.
    pub fn forget(&self, email: &str) {
        if let Some((_, user_id)) = self.users_by_email.remove(&normalize(email)) {
            self.emails_by_user.remove(&user_id);
        }
    }

    /// Starts a new session for a registered email.
    pub fn login(&self, email: &str) -> Result<Session, SessionError> {
        let user_id = self
            .users_by_email
            .get(&normalize(email))
            .map(|entry| *entry.value())
            .ok_or(SessionError::InvalidCredentials)?;
        Ok(self.issue(user_id))
    }

    pub fn email_of(&self, user_id: UserId) -> Option<String> {
        self.emails_by_user
            .get(&user_id)
            .map(|entry| entry.value().clone())
    }

    pub fn issue(&self, user_id: UserId) -> Session {
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            expires_at: Utc::now()
                .checked_add_signed(self.ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        self.sessions.insert(session.id, session.clone());
        session
    }

    /// The user a session id stands for. Expired sessions are evicted.
    pub fn resolve(&self, session_id: &str) -> Result<UserId, SessionError> {
        let session_id =
            Uuid::parse_str(session_id.trim()).map_err(|_| SessionError::Unauthenticated)?;
        let session = self
            .sessions
            .get(&session_id)
            .map(|session| session.value().clone())
            .ok_or(SessionError::Unauthenticated)?;
        if session.expires_at <= Utc::now() {
            self.sessions.remove(&session_id);
            tracing::debug!(%session_id, "Expired session evicted");
            return Err(SessionError::Unauthenticated);
        }
        Ok(session.user_id)
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}
