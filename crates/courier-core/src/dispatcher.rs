// ── Result dispatcher ──
//
// Delivers completed outcomes to per-request and globally registered
// listeners, on the caller's own context, exactly once per outcome
// category. Listener chains follow a bubble-and-consume protocol: the
// first listener that reports the event consumed stops the chain, which
// lets a request-scoped handler suppress an application-wide fallback.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use courier_api::{CallerContext, Error, Outcome, Session, SessionStore};

use crate::request::QueuedJob;

// ── Listener capabilities ────────────────────────────────────────────

/// Receives the successful content of one request.
///
/// Content listeners are per-request only: unlike errors and session
/// changes there is no global content chain, so a consumed return value
/// only matters when several listeners are registered on the same
/// request.
pub trait ContentListener<T>: Send {
    /// Handle the decoded content (`None` for write-style calls that
    /// produce no payload). Return `true` to consume the event.
    fn on_content(&mut self, content: Option<&T>) -> bool;
}

impl<T, F> ContentListener<T> for F
where
    F: FnMut(Option<&T>) -> bool + Send,
{
    fn on_content(&mut self, content: Option<&T>) -> bool {
        self(content)
    }
}

/// Receives the terminal error of a request. Request-scoped listeners
/// run before the global chain; returning `true` stops the bubbling.
pub trait ErrorListener: Send {
    fn on_error(&mut self, error: &Error) -> bool;
}

impl<F> ErrorListener for F
where
    F: FnMut(&Error) -> bool + Send,
{
    fn on_error(&mut self, error: &Error) -> bool {
        self(error)
    }
}

/// Receives a session change. Request-scoped listeners run before the
/// global chain; returning `true` stops the bubbling.
pub trait SessionListener: Send {
    fn on_session(&mut self, session: &Session) -> bool;
}

impl<F> SessionListener for F
where
    F: FnMut(&Session) -> bool + Send,
{
    fn on_session(&mut self, session: &Session) -> bool {
        self(session)
    }
}

// ── Global listener registry ─────────────────────────────────────────

/// Identifies one registration with a [`ListenerRegistry`], for later
/// removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Slot<L> = Arc<Mutex<Box<L>>>;

/// Explicitly-owned registry of application-wide listeners.
///
/// Constructed by the embedding application and handed to each client at
/// build time; sharing one registry across clients gives one place to
/// hang an app-wide error toast or a token-refresh hook. A registration
/// lives until the matching `remove_*` call -- completion of individual
/// requests never unregisters global listeners.
///
/// There is deliberately no global content chain: successful content goes
/// to the listeners of the request that produced it and nowhere else.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    error_listeners: Mutex<Vec<(ListenerId, Slot<dyn ErrorListener>)>>,
    session_listeners: Mutex<Vec<(ListenerId, Slot<dyn SessionListener>)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a listener for failures of any request routed through a
    /// client holding this registry. Runs after the failing request's own
    /// error listeners, in registration order.
    pub fn add_error_listener(&self, listener: impl ErrorListener + 'static) -> ListenerId {
        let id = self.allocate_id();
        let boxed: Box<dyn ErrorListener> = Box::new(listener);
        lock(&self.error_listeners).push((id, Arc::new(Mutex::new(boxed))));
        id
    }

    /// Remove a previously registered error listener. Returns `false`
    /// when the id is unknown (already removed).
    pub fn remove_error_listener(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.error_listeners);
        let before = listeners.len();
        listeners.retain(|(entry_id, _)| *entry_id != id);
        listeners.len() != before
    }

    /// Register a listener for session changes observed on any request.
    /// Runs after the originating request's own session listeners.
    pub fn add_session_listener(&self, listener: impl SessionListener + 'static) -> ListenerId {
        let id = self.allocate_id();
        let boxed: Box<dyn SessionListener> = Box::new(listener);
        lock(&self.session_listeners).push((id, Arc::new(Mutex::new(boxed))));
        id
    }

    /// Remove a previously registered session listener.
    pub fn remove_session_listener(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.session_listeners);
        let before = listeners.len();
        listeners.retain(|(entry_id, _)| *entry_id != id);
        listeners.len() != before
    }

    // Snapshots taken before invocation, so a listener that mutates the
    // registry from inside its callback cannot deadlock the chain.

    pub(crate) fn error_chain(&self) -> Vec<Slot<dyn ErrorListener>> {
        lock(&self.error_listeners)
            .iter()
            .map(|(_, slot)| Arc::clone(slot))
            .collect()
    }

    pub(crate) fn session_chain(&self) -> Vec<Slot<dyn SessionListener>> {
        lock(&self.session_listeners)
            .iter()
            .map(|(_, slot)| Arc::clone(slot))
            .collect()
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Chain delivery ───────────────────────────────────────────────────

/// Run the content chain: request-scoped listeners only.
pub(crate) fn deliver_content<T>(local: &mut [Box<dyn ContentListener<T>>], content: Option<&T>) {
    for listener in local.iter_mut() {
        if listener.on_content(content) {
            return;
        }
    }
}

/// Run the error chain: request-scoped listeners, then the global chain,
/// stopping at the first consumer.
pub(crate) fn deliver_error(
    local: &mut [Box<dyn ErrorListener>],
    global: &[Slot<dyn ErrorListener>],
    error: &Error,
) {
    for listener in local.iter_mut() {
        if listener.on_error(error) {
            return;
        }
    }
    for slot in global {
        if lock(slot).on_error(error) {
            return;
        }
    }
}

/// Run the session chain: request-scoped listeners, then the global
/// chain, stopping at the first consumer.
pub(crate) fn deliver_session(
    local: &mut [Box<dyn SessionListener>],
    global: &[Slot<dyn SessionListener>],
    session: &Session,
) {
    for listener in local.iter_mut() {
        if listener.on_session(session) {
            return;
        }
    }
    for slot in global {
        if lock(slot).on_session(session) {
            return;
        }
    }
}

/// Unwind-isolate one listener category. A listener that panics is a
/// caller bug; the panic must still not suppress the other categories of
/// the same outcome or stall the consumer loop.
pub(crate) fn shielded(category: &'static str, deliver: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(deliver)).is_err() {
        warn!(category, "listener panicked during delivery");
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────

/// Routes one completed request back to its caller.
///
/// Publishes the session change to the shared store (single writer,
/// before any session listener observes the new value), freezes the
/// request's write-once completion, and marshals the listener chains to
/// the caller's context.
pub(crate) struct Dispatcher {
    registry: Arc<ListenerRegistry>,
    session_store: Arc<dyn SessionStore>,
    context: Arc<dyn CallerContext>,
}

impl Dispatcher {
    pub(crate) fn new(
        registry: Arc<ListenerRegistry>,
        session_store: Arc<dyn SessionStore>,
        context: Arc<dyn CallerContext>,
    ) -> Self {
        Self {
            registry,
            session_store,
            context,
        }
    }

    pub(crate) fn dispatch(&self, job: Arc<dyn QueuedJob>, outcome: Outcome) {
        if let Some(session) = outcome.session.clone() {
            self.session_store.replace(session);
        }

        // Completion is frozen before delivery is even scheduled, so the
        // waiting accessor and late-joining listeners observe the outcome
        // no matter what the caller's context does with the closure.
        job.store_outcome(outcome);

        let registry = Arc::clone(&self.registry);
        self.context.run(Box::new(move || job.deliver(&registry)));
    }
}
