// courier-api: Contracts between the courier request pipeline and its collaborators.

pub mod context;
pub mod error;
pub mod executor;
pub mod outcome;
pub mod request;
pub mod session;

// ── Primary re-exports ──────────────────────────────────────────────
pub use context::{CallerContext, TokioSpawn};
pub use error::Error;
pub use executor::RequestExecutor;
pub use outcome::Outcome;
pub use request::{Method, RequestDescriptor, Ticket};
pub use session::{InMemorySessionStore, Session, SessionStore};
