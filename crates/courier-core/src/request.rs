// ── Request handles ──
//
// The caller-facing side of one queued API call: listener registration,
// cancellation, and the write-once completion cell shared between the
// waiting accessor and the listener chains. The consumer loop sees the
// same object through the type-erased `QueuedJob` view.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use courier_api::{Error, Outcome, RequestDescriptor, Session, Ticket};

use crate::dispatcher::{
    ContentListener, ErrorListener, ListenerRegistry, SessionListener, deliver_content,
    deliver_error, deliver_session, shielded,
};
use crate::error::SubmitError;
use crate::queue::RequestQueue;

// ── Consumer-side view ───────────────────────────────────────────────

/// Type-erased view of a queued request, as seen by the consumer loop
/// and the dispatcher.
pub(crate) trait QueuedJob: Send + Sync {
    fn descriptor(&self) -> &RequestDescriptor;
    fn cancel_token(&self) -> &CancellationToken;

    /// Decode the outcome against the expected content shape and freeze
    /// it as this request's write-once completion.
    fn store_outcome(&self, outcome: Outcome);

    /// Complete as cancelled: the accessor unblocks with
    /// [`Error::Cancelled`], no listener delivery happens.
    fn finish_cancelled(&self);

    /// Run the listener chains for the frozen completion. Called on the
    /// caller's context, never on the consumer loop.
    fn deliver(&self, registry: &ListenerRegistry);
}

// ── Shared completion state ──────────────────────────────────────────

struct Completion<T> {
    result: Result<Option<Arc<T>>, Error>,
    session: Option<Session>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            result: self.result.clone(),
            session: self.session.clone(),
        }
    }
}

struct ListenerSet<T> {
    content: Vec<Box<dyn ContentListener<T>>>,
    error: Vec<Box<dyn ErrorListener>>,
    session: Vec<Box<dyn SessionListener>>,
}

impl<T> Default for ListenerSet<T> {
    fn default() -> Self {
        Self {
            content: Vec::new(),
            error: Vec::new(),
            session: Vec::new(),
        }
    }
}

struct StateInner<T> {
    listeners: ListenerSet<T>,
    completion: Option<Completion<T>>,
    delivered: bool,
}

struct RequestInner<T> {
    descriptor: RequestDescriptor,
    cancel: CancellationToken,
    state: Mutex<StateInner<T>>,
    done: Notify,
}

impl<T> RequestInner<T> {
    fn lock_state(&self) -> MutexGuard<'_, StateInner<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_completion(&self, completion: Completion<T>) {
        {
            let mut state = self.lock_state();
            if state.completion.is_some() {
                debug!(
                    ticket = %self.descriptor.ticket,
                    "completion already set; keeping the first outcome"
                );
                return;
            }
            state.completion = Some(completion);
        }
        self.done.notify_waiters();
    }
}

fn decode<T: DeserializeOwned>(
    result: Result<Option<Value>, Error>,
) -> Result<Option<Arc<T>>, Error> {
    match result {
        Ok(Some(value)) => match serde_json::from_value::<T>(value) {
            Ok(content) => Ok(Some(Arc::new(content))),
            Err(source) => Err(Error::Deserialization {
                message: source.to_string(),
            }),
        },
        Ok(None) => Ok(None),
        Err(error) => Err(error),
    }
}

impl<T> QueuedJob for RequestInner<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn store_outcome(&self, outcome: Outcome) {
        self.set_completion(Completion {
            result: decode::<T>(outcome.result),
            session: outcome.session,
        });
    }

    fn finish_cancelled(&self) {
        self.set_completion(Completion {
            result: Err(Error::Cancelled),
            session: None,
        });
    }

    fn deliver(&self, registry: &ListenerRegistry) {
        // Listeners are taken out of the state before any of them runs:
        // the chains never execute under the state lock, and a listener
        // registering further listeners from inside its callback hits the
        // already-done replay path instead of this delivery.
        let (completion, mut listeners) = {
            let mut state = self.lock_state();
            let Some(completion) = state.completion.clone() else {
                debug!(
                    ticket = %self.descriptor.ticket,
                    "delivery scheduled without completion; dropping"
                );
                return;
            };
            if state.delivered {
                // A re-submitted handle can reach the dispatcher twice;
                // each outcome category is delivered at most once.
                return;
            }
            state.delivered = true;
            (completion, std::mem::take(&mut state.listeners))
        };

        if let Some(session) = &completion.session {
            shielded("session", || {
                deliver_session(&mut listeners.session, &registry.session_chain(), session);
            });
        }

        match &completion.result {
            Ok(content) => shielded("content", || {
                deliver_content(&mut listeners.content, content.as_deref());
            }),
            Err(error) => shielded("error", || {
                deliver_error(&mut listeners.error, &registry.error_chain(), error);
            }),
        }
    }
}

// ── Caller-facing handle ─────────────────────────────────────────────

/// Handle to one queued API call, typed over the expected content shape.
///
/// Created by [`QueuedClient::request`](crate::QueuedClient::request),
/// submitted with [`submit`](Self::submit), observed through listeners or
/// the waiting accessor -- both see the identical write-once outcome.
/// Clones are cheap and share all state; the caller keeps a clone to
/// poll or cancel after submission hands logical ownership to the
/// pipeline.
pub struct RestRequest<T> {
    inner: Arc<RequestInner<T>>,
    queue: Weak<RequestQueue<Arc<dyn QueuedJob>>>,
}

impl<T> Clone for RestRequest<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            queue: Weak::clone(&self.queue),
        }
    }
}

impl<T> RestRequest<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    pub(crate) fn new(
        descriptor: RequestDescriptor,
        queue: Weak<RequestQueue<Arc<dyn QueuedJob>>>,
    ) -> Self {
        Self {
            inner: Arc::new(RequestInner {
                descriptor,
                cancel: CancellationToken::new(),
                state: Mutex::new(StateInner {
                    listeners: ListenerSet::default(),
                    completion: None,
                    delivered: false,
                }),
                done: Notify::new(),
            }),
            queue,
        }
    }

    /// The opaque identity the caller can use as a lookup key.
    pub fn ticket(&self) -> Ticket {
        self.inner.descriptor.ticket
    }

    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.inner.descriptor
    }

    /// Enqueue this request. Non-blocking: fails with
    /// [`SubmitError::QueueFull`] when the queue is at capacity and
    /// [`SubmitError::Closed`] when the owning client is gone or shut
    /// down.
    pub fn submit(&self) -> Result<(), SubmitError> {
        let queue = self.queue.upgrade().ok_or(SubmitError::Closed)?;
        queue.try_enqueue(self.as_job())
    }

    /// Request best-effort cancellation.
    ///
    /// A request still in the queue is skipped by the consumer and
    /// completes as [`Error::Cancelled`] without listener delivery; a
    /// request already handed to the executor has its execution future
    /// dropped, with whatever semantics the executor attaches to that.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Whether the terminal outcome has been recorded.
    pub fn is_done(&self) -> bool {
        self.inner.lock_state().completion.is_some()
    }

    /// Register a content listener.
    ///
    /// On a still-running request the listener is stored for delivery;
    /// on an already-done request that succeeded, the stored content
    /// replays to the new listener synchronously, on the calling thread,
    /// before this method returns. Registrations are never deduplicated.
    pub fn with_content_listener(&self, listener: impl ContentListener<T> + 'static) -> &Self {
        let mut listener = Box::new(listener);
        let replay = {
            let mut state = self.inner.lock_state();
            match state.completion.as_ref() {
                None => {
                    state.listeners.content.push(listener);
                    return self;
                }
                Some(completion) => completion.result.as_ref().ok().cloned(),
            }
        };
        if let Some(content) = replay {
            listener.on_content(content.as_deref());
        }
        self
    }

    /// Register an error listener; replays the stored error when the
    /// request already failed. See
    /// [`with_content_listener`](Self::with_content_listener) for the
    /// late-join semantics.
    pub fn with_error_listener(&self, listener: impl ErrorListener + 'static) -> &Self {
        let mut listener = Box::new(listener);
        let replay = {
            let mut state = self.inner.lock_state();
            match state.completion.as_ref() {
                None => {
                    state.listeners.error.push(listener);
                    return self;
                }
                Some(completion) => completion.result.as_ref().err().cloned(),
            }
        };
        if let Some(error) = replay {
            listener.on_error(&error);
        }
        self
    }

    /// Register a session listener; replays the stored session change
    /// when the completed request carried one.
    pub fn with_session_listener(&self, listener: impl SessionListener + 'static) -> &Self {
        let mut listener = Box::new(listener);
        let replay = {
            let mut state = self.inner.lock_state();
            match state.completion.as_ref() {
                None => {
                    state.listeners.session.push(listener);
                    return self;
                }
                Some(completion) => completion.session.clone(),
            }
        };
        if let Some(session) = replay {
            listener.on_session(&session);
        }
        self
    }

    /// Wait for the terminal outcome: the decoded content on success, the
    /// terminal error otherwise.
    ///
    /// Purged requests never complete -- pair this with
    /// [`get_timeout`](Self::get_timeout) when the session may be revoked
    /// underneath the backlog.
    pub async fn get(&self) -> Result<Option<Arc<T>>, Error> {
        loop {
            let notified = self.inner.done.notified();
            if let Some(result) = self.try_result() {
                return result;
            }
            notified.await;
        }
    }

    /// Bounded wait for the terminal outcome.
    ///
    /// Elapsing fails this call with the distinct [`Error::Timeout`]; the
    /// request itself keeps running and still completes (and delivers to
    /// listeners) independently of this waiter.
    pub async fn get_timeout(&self, timeout: Duration) -> Result<Option<Arc<T>>, Error> {
        match tokio::time::timeout(timeout, self.get()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                timeout_secs: timeout.as_secs(),
            }),
        }
    }

    fn try_result(&self) -> Option<Result<Option<Arc<T>>, Error>> {
        self.inner
            .lock_state()
            .completion
            .as_ref()
            .map(|completion| completion.result.clone())
    }

    pub(crate) fn as_job(&self) -> Arc<dyn QueuedJob> {
        Arc::clone(&self.inner) as Arc<dyn QueuedJob>
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use courier_api::Method;
    use serde_json::json;
    use url::Url;

    fn bare_request<T>() -> RestRequest<T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let descriptor = RequestDescriptor::new(
            Method::Get,
            Url::parse("https://api.example.com/items").unwrap(),
        );
        RestRequest::new(descriptor, Weak::new())
    }

    #[test]
    fn submit_without_a_client_fails_closed() {
        let request = bare_request::<Value>();
        assert_eq!(request.submit(), Err(SubmitError::Closed));
    }

    #[test]
    fn decode_failure_becomes_a_deserialization_error() {
        #[derive(Debug, serde::Deserialize)]
        struct Item {
            #[allow(dead_code)]
            id: u64,
        }

        let request = bare_request::<Item>();
        request
            .as_job()
            .store_outcome(Outcome::success(json!({ "id": "not-a-number" })));

        assert!(matches!(
            request.try_result(),
            Some(Err(Error::Deserialization { .. }))
        ));
    }

    #[test]
    fn completion_is_write_once() {
        let request = bare_request::<Value>();
        let job = request.as_job();
        job.store_outcome(Outcome::success(json!(1)));
        job.store_outcome(Outcome::success(json!(2)));

        let content = request.try_result().unwrap().unwrap().unwrap();
        assert_eq!(*content, json!(1));
    }

    #[test]
    fn cancelled_completion_does_not_deliver_listeners() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let request = bare_request::<Value>();
        let called = Arc::new(AtomicBool::new(false));
        {
            let called = Arc::clone(&called);
            request.with_error_listener(move |_: &Error| {
                called.store(true, Ordering::SeqCst);
                true
            });
        }

        request.as_job().finish_cancelled();

        // The accessor observes the cancellation, but listeners that
        // were registered before it are never invoked.
        assert!(matches!(request.try_result(), Some(Err(Error::Cancelled))));
        assert!(!called.load(Ordering::SeqCst));
    }
}
