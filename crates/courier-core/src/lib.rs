// courier-core: Bounded request queue, single-consumer loop, and result
// delivery for the courier REST SDK.
//
// Producers submit requests from any task or thread; a single consumer
// executes them strictly in admission order through an external
// `RequestExecutor` and marshals every result back to the caller's own
// context. The pipeline owns completion and listener delivery; transport,
// serialization of domain objects, and provider conveniences live behind
// the contracts in `courier-api`.

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod request;

mod queue;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::{CAPACITY_DEFAULT, QueuedClient, QueuedClientBuilder, WorkerState};
pub use dispatcher::{
    ContentListener, ErrorListener, ListenerId, ListenerRegistry, SessionListener,
};
pub use error::SubmitError;
pub use request::RestRequest;
