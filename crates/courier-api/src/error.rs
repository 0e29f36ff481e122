use thiserror::Error;

/// Terminal error for one queued request.
///
/// Deliberately `Clone`: the blocking accessor and every registered error
/// listener observe the identical terminal outcome, so the error must be
/// shareable without consuming it. All variants carry owned strings instead
/// of transport-library types -- the transport lives behind
/// [`RequestExecutor`](crate::RequestExecutor) and is expected to translate
/// its own failures into these variants.
#[derive(Debug, Clone, Error)]
pub enum Error {
    // ── Authorization ───────────────────────────────────────────────
    /// The session backing this call is no longer authorized
    /// (revoked or expired token).
    #[error("Not authorized: {message}")]
    Unauthorized { message: String },

    // ── Execution ───────────────────────────────────────────────────
    /// The request never produced a server response (connection refused,
    /// DNS failure, socket timeout).
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The server answered with a failure envelope.
    #[error("API error: {message}")]
    Api {
        message: String,
        /// API-specific error code, when the envelope carries one.
        code: Option<String>,
        /// HTTP status code, if applicable.
        status: Option<u16>,
    },

    /// The response body could not be decoded into the expected shape.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String },

    // ── Local ───────────────────────────────────────────────────────
    /// The request was cancelled before a result was produced.
    #[error("Request cancelled")]
    Cancelled,

    /// A bounded wait for the result elapsed. Only ever produced by the
    /// waiting accessor; the request itself keeps running and completes
    /// independently of this error.
    #[error("Timed out after {timeout_secs}s waiting for a result")]
    Timeout { timeout_secs: u64 },
}

impl Error {
    /// Returns `true` if this error means the current session is not
    /// usable and re-authentication is required.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Returns `true` if the request was cancelled rather than executed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if this is the waiting accessor's timeout, as
    /// opposed to a failure of the request itself.
    pub fn is_wait_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Extract the API error code, if available.
    pub fn api_error_code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}
