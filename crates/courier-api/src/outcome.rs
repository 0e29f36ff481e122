// ── Execution outcomes ──

use serde_json::Value;

use crate::error::Error;
use crate::session::Session;

/// Terminal result of executing one request.
///
/// Success and failure are mutually exclusive (encoded as `Result`); a
/// session change is orthogonal and may accompany either. The success
/// payload is optional -- write-style calls legitimately produce nothing.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub result: Result<Option<Value>, Error>,
    /// Refreshed session, present iff this outcome carries a session change.
    pub session: Option<Session>,
}

impl Outcome {
    /// A successful outcome carrying a content payload.
    pub fn success(content: Value) -> Self {
        Self {
            result: Ok(Some(content)),
            session: None,
        }
    }

    /// A successful outcome with no content (write-style calls).
    pub fn empty() -> Self {
        Self {
            result: Ok(None),
            session: None,
        }
    }

    /// A failed outcome.
    pub fn failure(error: Error) -> Self {
        Self {
            result: Err(error),
            session: None,
        }
    }

    /// Attach a session change to this outcome.
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Whether this outcome reports that authorization has been lost:
    /// it carries a session and that session is not authorized.
    pub fn revokes_authorization(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| !session.is_authorized())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;

    #[test]
    fn success_and_failure_are_mutually_exclusive() {
        assert!(Outcome::success(json!({"id": 1})).is_success());
        assert!(Outcome::empty().is_success());
        assert!(
            !Outcome::failure(Error::Transport {
                message: "connection refused".into()
            })
            .is_success()
        );
    }

    #[test]
    fn outcome_without_session_does_not_revoke() {
        assert!(!Outcome::empty().revokes_authorization());
    }

    #[test]
    fn authorized_session_does_not_revoke() {
        let outcome = Outcome::empty().with_session(Session::authorized(
            "token",
            "refresh",
            Utc::now() + Duration::hours(1),
        ));
        assert!(!outcome.revokes_authorization());
    }

    #[test]
    fn revoked_session_revokes_even_on_success() {
        let outcome = Outcome::success(json!({"ok": true})).with_session(Session::revoked());
        assert!(outcome.is_success());
        assert!(outcome.revokes_authorization());
    }
}
