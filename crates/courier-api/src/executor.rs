use async_trait::async_trait;

use crate::outcome::Outcome;
use crate::request::RequestDescriptor;

/// Executes one request against the remote API.
///
/// Invoked exactly once per dequeued request, on the pipeline's consumer
/// task -- never on the caller's context. Implementations own the transport
/// (HTTP, TLS, envelope parsing) and report every failure through
/// [`Outcome`]; nothing may panic across this boundary.
///
/// Implementations must not retry internally: the pipeline relies on one
/// `execute` call mapping to one terminal outcome, and retry policy (if
/// any) belongs to the embedding application.
///
/// Cancellation is delivered by dropping the returned future; an
/// implementation that needs to release resources on cancellation should
/// do so in a drop guard.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn execute(&self, request: &RequestDescriptor) -> Outcome;
}
