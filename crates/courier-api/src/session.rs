// ── Session state ──
//
// Process-wide authentication state. A session is replaced wholesale on
// every (re)authentication -- readers observe either the old or the new
// value, never a partial update.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Authentication state for the remote API.
///
/// Carries the token material an authentication-bearing response produces.
/// A session with no access token (or an expired one) is not authorized;
/// the pipeline purges pending work when it sees such a session come back
/// on an outcome.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Session {
    pub access_token: Option<SecretString>,
    pub refresh_token: Option<SecretString>,
    pub expires: Option<DateTime<Utc>>,
}

impl Session {
    /// A session with fresh token material.
    pub fn authorized(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: Some(SecretString::from(access_token.into())),
            refresh_token: Some(SecretString::from(refresh_token.into())),
            expires: Some(expires),
        }
    }

    /// A session whose tokens have been revoked.
    pub fn revoked() -> Self {
        Self::default()
    }

    /// Whether this session can still back API calls: an access token is
    /// present, non-empty, and not past its expiry.
    pub fn is_authorized(&self) -> bool {
        let has_token = self
            .access_token
            .as_ref()
            .is_some_and(|token| !token.expose_secret().is_empty());
        has_token && self.expires.is_none_or(|expires| expires > Utc::now())
    }
}

/// Shared storage for the process-wide [`Session`].
///
/// Single writer (the pipeline's consumer task), any number of readers.
/// `replace` swaps the whole value; there is deliberately no field-level
/// mutation on this interface.
pub trait SessionStore: Send + Sync {
    /// Snapshot of the current session.
    fn current(&self) -> Arc<Session>;

    /// Replace the current session wholesale.
    fn replace(&self, session: Session);
}

/// Default in-process [`SessionStore`].
///
/// Backed by `ArcSwap`, so reads are lock-free and writes publish a whole
/// new `Arc<Session>` atomically.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    current: ArcSwap<Session>,
}

impl InMemorySessionStore {
    pub fn new(initial: Session) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }
}

impl SessionStore for InMemorySessionStore {
    fn current(&self) -> Arc<Session> {
        self.current.load_full()
    }

    fn replace(&self, session: Session) {
        self.current.store(Arc::new(session));
    }
}
