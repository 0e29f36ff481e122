// ── Queued client ──
//
// Producer/consumer core of the SDK's REST client. Callers on any task or
// thread submit requests; one consumer task per client executes them
// strictly in admission order and hands outcomes to the dispatcher. At
// most one request is in flight at a time -- ordering is traded for
// throughput, and callers that need parallelism run multiple clients.

use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use courier_api::{
    CallerContext, InMemorySessionStore, Method, Outcome, RequestDescriptor, RequestExecutor,
    Session, SessionStore,
};
use url::Url;

use crate::dispatcher::{Dispatcher, ListenerRegistry};
use crate::queue::RequestQueue;
use crate::request::{QueuedJob, RestRequest};

/// Default queue capacity: one pending slot, which makes admission an
/// effectively synchronous hand-off unless configured larger.
pub const CAPACITY_DEFAULT: usize = 1;

/// Observable state of the consumer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Waiting for a request to become available.
    Idle,
    /// Executing one request.
    Processing,
    /// The loop has exited; the client was shut down or dropped.
    Stopped,
}

// ── Client ───────────────────────────────────────────────────────────

/// A REST client core that serializes outbound API calls.
///
/// Cheaply cloneable; all clones share the queue and the single consumer
/// task. Construction spawns the consumer immediately (a tokio runtime
/// must be current); [`shutdown`](Self::shutdown) stops it cleanly, and
/// dropping the last clone stops it on a best-effort basis.
#[derive(Clone)]
pub struct QueuedClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    queue: Arc<RequestQueue<Arc<dyn QueuedJob>>>,
    registry: Arc<ListenerRegistry>,
    session_store: Arc<dyn SessionStore>,
    cancel: CancellationToken,
    worker_state: watch::Receiver<WorkerState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.queue.close();
    }
}

impl QueuedClient {
    /// Start building a client around an executor and a caller context.
    pub fn builder(
        executor: Arc<dyn RequestExecutor>,
        context: Arc<dyn CallerContext>,
    ) -> QueuedClientBuilder {
        QueuedClientBuilder {
            executor,
            context,
            capacity: CAPACITY_DEFAULT,
            registry: None,
            session_store: None,
        }
    }

    /// Create a request handle bound to this client's queue. The request
    /// is not admitted until [`RestRequest::submit`] is called.
    pub fn request<T>(&self, method: Method, url: Url) -> RestRequest<T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.request_from(RequestDescriptor::new(method, url))
    }

    /// Create a request handle from a fully-formed descriptor (the
    /// provider-layer entry point).
    pub fn request_from<T>(&self, descriptor: RequestDescriptor) -> RestRequest<T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        RestRequest::new(descriptor, Arc::downgrade(&self.inner.queue))
    }

    /// Point-in-time number of pending requests, for observability only.
    pub fn queue_size(&self) -> usize {
        self.inner.queue.len()
    }

    /// Subscribe to consumer loop state changes.
    pub fn worker_state(&self) -> watch::Receiver<WorkerState> {
        self.inner.worker_state.clone()
    }

    /// The registry of application-wide error/session listeners this
    /// client delivers through.
    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.inner.registry
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> Arc<Session> {
        self.inner.session_store.current()
    }

    pub fn session_store(&self) -> &Arc<dyn SessionStore> {
        &self.inner.session_store
    }

    /// Stop the consumer loop and wait for it to exit.
    ///
    /// Further submissions fail with
    /// [`SubmitError::Closed`](crate::SubmitError::Closed); requests
    /// still pending complete as `Error::Cancelled` so their waiters
    /// unblock, without listener delivery.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.queue.close();

        let worker = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = worker {
            if handle.await.is_err() {
                warn!("consumer task panicked or was aborted during shutdown");
            }
        }
        debug!("client shut down");
    }
}

// ── Builder ──────────────────────────────────────────────────────────

/// Configures and starts a [`QueuedClient`].
pub struct QueuedClientBuilder {
    executor: Arc<dyn RequestExecutor>,
    context: Arc<dyn CallerContext>,
    capacity: usize,
    registry: Option<Arc<ListenerRegistry>>,
    session_store: Option<Arc<dyn SessionStore>>,
}

impl QueuedClientBuilder {
    /// Queue capacity. A value of `0` falls back to
    /// [`CAPACITY_DEFAULT`].
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = if capacity == 0 {
            CAPACITY_DEFAULT
        } else {
            capacity
        };
        self
    }

    /// Share an application-wide listener registry with this client.
    pub fn registry(mut self, registry: Arc<ListenerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use an external session store instead of a fresh in-memory one.
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Build the client and spawn its consumer task.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn build(self) -> QueuedClient {
        let queue = Arc::new(RequestQueue::new(self.capacity));
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(ListenerRegistry::new()));
        let session_store: Arc<dyn SessionStore> = self
            .session_store
            .unwrap_or_else(|| Arc::new(InMemorySessionStore::default()));

        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&session_store),
            self.context,
        );
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(WorkerState::Idle);

        let worker = tokio::spawn(consumer_loop(
            self.executor,
            Arc::clone(&queue),
            dispatcher,
            cancel.clone(),
            state_tx,
        ));

        QueuedClient {
            inner: Arc::new(ClientInner {
                queue,
                registry,
                session_store,
                cancel,
                worker_state: state_rx,
                worker: Mutex::new(Some(worker)),
            }),
        }
    }
}

// ── Consumer loop ────────────────────────────────────────────────────

/// The single consumer: one request at a time, dequeue to dispatch.
///
/// Blocking on the executor is deliberate -- it keeps per-request
/// ordering and leaves the session gate free of races with concurrent
/// executions. A wakeup without work (the async analogue of an
/// interrupted wait) just re-enters the dequeue.
async fn consumer_loop(
    executor: Arc<dyn RequestExecutor>,
    queue: Arc<RequestQueue<Arc<dyn QueuedJob>>>,
    dispatcher: Dispatcher,
    cancel: CancellationToken,
    state: watch::Sender<WorkerState>,
) {
    loop {
        let _ = state.send(WorkerState::Idle);

        let job = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            job = queue.dequeue() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let _ = state.send(WorkerState::Processing);

        if job.cancel_token().is_cancelled() {
            // Cancelled while still queued: skipped without delivery.
            job.finish_cancelled();
            continue;
        }

        debug!(
            method = %job.descriptor().method,
            url = %job.descriptor().url,
            "executing request"
        );

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                job.finish_cancelled();
                break;
            }
            () = job.cancel_token().cancelled() => {
                job.finish_cancelled();
                continue;
            }
            outcome = executor.execute(job.descriptor()) => outcome,
        };

        apply_session_gate(&outcome, &queue);
        dispatcher.dispatch(job, outcome);
    }

    // Graceful exit: unblock waiters of requests that will never run.
    // No listener delivery for these.
    let drained = queue.clear();
    if !drained.is_empty() {
        debug!(pending = drained.len(), "cancelling pending requests on shutdown");
    }
    for job in drained {
        job.finish_cancelled();
    }
    let _ = state.send(WorkerState::Stopped);
}

/// Session gate: an outcome that reports lost authorization purges every
/// still-pending request before it is delivered.
///
/// Purged requests get no callbacks at all -- one revoked session would
/// otherwise fan out into a redundant error per queued request. The
/// request currently being processed is already out of the queue and is
/// not affected.
fn apply_session_gate(outcome: &Outcome, queue: &RequestQueue<Arc<dyn QueuedJob>>) {
    if !outcome.revokes_authorization() {
        return;
    }
    let purged = queue.clear();
    if !purged.is_empty() {
        warn!(
            purged = purged.len(),
            "session no longer authorized -- purging pending requests"
        );
    }
}
