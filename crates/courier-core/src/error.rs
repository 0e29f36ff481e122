use thiserror::Error;

/// Synchronous admission failure.
///
/// Submission is the only synchronous error surface of the pipeline: a
/// rejected request was never admitted, so no callback will ever fire for
/// it. Everything that happens after admission is reported asynchronously
/// through the listener chains or the waiting accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The queue is at capacity. The submitting thread is never blocked;
    /// callers retry or drop the request at their discretion.
    #[error("Request queue is full")]
    QueueFull,

    /// The owning client has been shut down (or dropped); no further
    /// requests are accepted.
    #[error("Client is shut down")]
    Closed,
}
