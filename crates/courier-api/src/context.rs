// ── Caller-context dispatch ──
//
// Result delivery is marshaled back to whatever execution context
// originated a request (a UI event loop, an actor mailbox, a test
// harness). The pipeline only ever hands closures to this trait; it never
// runs listeners on its own consumer task.

/// Runs a callback on the context a request's submitter expects to
/// receive results on.
///
/// The delivery order observed by the caller is this trait's contract:
/// implementations that feed a single queue (an event loop, a channel)
/// preserve the pipeline's FIFO completion order, while fire-and-forget
/// implementations like [`TokioSpawn`] do not.
pub trait CallerContext: Send + Sync {
    fn run(&self, task: Box<dyn FnOnce() + Send + 'static>);
}

/// Caller context that spawns each delivery onto a tokio runtime.
///
/// Suitable when the caller has no single home thread and does not care
/// about cross-request delivery ordering.
#[derive(Debug, Clone)]
pub struct TokioSpawn {
    handle: tokio::runtime::Handle,
}

impl TokioSpawn {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Bind to the runtime the calling code is running on.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl CallerContext for TokioSpawn {
    fn run(&self, task: Box<dyn FnOnce() + Send + 'static>) {
        drop(self.handle.spawn(async move { task() }));
    }
}
