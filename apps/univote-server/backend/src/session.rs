use axum::{async_trait, extract::FromRequestParts, http::request::Parts, RequestPartsExt};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use time::OffsetDateTime;
use types_rs::univote::Voter;
use uuid::Uuid;

use crate::{error::Error, state::AppState};

/// Represents a login session that is kept in memory.
#[derive(Debug, Clone)]
pub struct Session {
    /// The account that logged in.
    voter_id: Uuid,

    /// The session token. This is meant to be opaque to the client.
    token: Uuid,

    /// The expiration time of the session.
    expiration: OffsetDateTime,
}

impl Session {
    fn new(voter_id: Uuid, duration: time::Duration, now: OffsetDateTime) -> Self {
        Self {
            voter_id,
            token: Uuid::new_v4(),
            expiration: now + duration,
        }
    }

    pub const fn voter_id(&self) -> Uuid {
        self.voter_id
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now > self.expiration
    }

    /// Returns the session token.
    pub fn token(&self) -> impl ToString {
        self.token
    }

    pub const fn expiration(&self) -> OffsetDateTime {
        self.expiration
    }
}

/// Manages a collection of login sessions stored in memory.
#[derive(Debug)]
pub struct SessionManager {
    sessions: Vec<Session>,
    duration: time::Duration,
}

impl SessionManager {
    pub const fn new(duration: time::Duration) -> Self {
        Self {
            sessions: Vec::new(),
            duration,
        }
    }

    /// Creates a new session and returns it.
    pub fn create(&mut self, voter_id: Uuid, now: OffsetDateTime) -> Session {
        let session = Session::new(voter_id, self.duration, now);
        self.sessions.push(session.clone());
        session
    }

    /// Validates a session token and returns the session if it is valid.
    pub fn validate(&mut self, token: Uuid, now: OffsetDateTime) -> Option<Session> {
        self.sessions.retain(|s| !s.is_expired(now));
        self.sessions.iter().find(|s| s.token == token).cloned()
    }

    /// Ends the session with the given token, if any.
    pub fn remove(&mut self, token: Uuid) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.token != token);
        self.sessions.len() != before
    }
}

fn unauthorized() -> Error {
    Error::Unauthorized("Please log in".to_owned())
}

/// The bearer token of the request, if it is well-formed.
pub struct Token(pub Uuid);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Token {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| unauthorized())?;
        let token = Uuid::parse_str(bearer.token()).map_err(|_| unauthorized())?;
        Ok(Self(token))
    }
}

/// The logged-in, active account making the request. Including this in a
/// handler's signature requires a valid session.
#[derive(Debug, Clone)]
pub struct CurrentVoter(pub Voter);

#[async_trait]
impl FromRequestParts<AppState> for CurrentVoter {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Token(token) = parts.extract::<Token>().await?;

        let session = {
            let mut sessions = state.sessions.lock().await;
            sessions.validate(token, OffsetDateTime::now_utc())
        };

        let Some(session) = session else {
            tracing::warn!("Unauthorized session: {token}");
            return Err(unauthorized());
        };

        // re-read so that deactivation and role changes apply immediately
        let Some(voter) = state.store.get_voter(session.voter_id()).await? else {
            tracing::warn!("Session for unknown voter: {}", session.voter_id());
            return Err(unauthorized());
        };

        if !voter.is_active {
            return Err(Error::Forbidden(
                "This account has been deactivated".to_owned(),
            ));
        }

        tracing::debug!("Authorized session for voter {}", voter.id);
        Ok(Self(voter))
    }
}

/// Like [`CurrentVoter`], additionally requiring the admin role.
#[derive(Debug, Clone)]
pub struct Admin(pub Voter);

#[async_trait]
impl FromRequestParts<AppState> for Admin {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentVoter(voter) = CurrentVoter::from_request_parts(parts, state).await?;
        if !voter.is_admin() {
            tracing::warn!("Voter {} tried to use an admin route", voter.id);
            return Err(Error::Forbidden(
                "Administrator access required".to_owned(),
            ));
        }
        Ok(Self(voter))
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn test_sessions_expire() {
        let mut sessions = SessionManager::new(time::Duration::minutes(30));
        let voter_id = Uuid::new_v4();
        let login = datetime!(2025-01-01 9:00 UTC);
        let session = sessions.create(voter_id, login);
        let token = Uuid::parse_str(&session.token().to_string()).unwrap();

        let found = sessions
            .validate(token, datetime!(2025-01-01 9:30 UTC))
            .unwrap();
        assert_eq!(found.voter_id(), voter_id);

        assert!(sessions
            .validate(token, datetime!(2025-01-01 9:30:01 UTC))
            .is_none());
        // expired sessions are dropped
        assert!(sessions.sessions.is_empty());
    }

    #[test]
    fn test_unknown_token() {
        let mut sessions = SessionManager::new(time::Duration::minutes(30));
        sessions.create(Uuid::new_v4(), datetime!(2025-01-01 9:00 UTC));
        assert!(sessions
            .validate(Uuid::new_v4(), datetime!(2025-01-01 9:01 UTC))
            .is_none());
    }

    #[test]
    fn test_remove() {
        let mut sessions = SessionManager::new(time::Duration::minutes(30));
        let session = sessions.create(Uuid::new_v4(), datetime!(2025-01-01 9:00 UTC));
        let token = Uuid::parse_str(&session.token().to_string()).unwrap();

        assert!(sessions.remove(token));
        assert!(!sessions.remove(token));
        assert!(sessions
            .validate(token, datetime!(2025-01-01 9:01 UTC))
            .is_none());
    }
}
