//! Image load controller: one probe slot per image.
//!
//! ```text
//! Idle ──start_load(url)──▶ Pending ──completion──▶ Loaded(geometry) | Failed
//!                              ▲                             │
//!                              └──────start_load(other)──────┘
//! ```
//!
//! # Supersession
//!
//! Every attempt gets a fresh [`LoadToken`]. Probes report back through a
//! completion queue tagged with that token, and only the completion whose
//! token matches the most recently started attempt may commit. Starting a
//! new url therefore detaches the previous probe: it may still finish, but
//! its result is dropped on arrival.
//!
//! # Where probes run
//!
//! The controller never runs a probe itself. A [`ProbeDispatch`] decides:
//! [`PoolDispatch`] runs the backend on the rayon pool, [`DeferredDispatch`]
//! hands requests to the host so it can fetch with its own transport.
//! Either way results are applied only when the owner calls [`ImageLoader::poll`]
//! or [`ImageLoader::wait`], so state is only ever mutated on the owner's
//! thread.
//!
//! # Teardown
//!
//! [`ImageLoader::dispose`] consumes the controller. Dropping it drops the
//! receiving end of the queue, so in-flight probes fail to send and their
//! results go nowhere.

use crate::imaging::{BackendError, Dimensions, ProbeBackend};
use crate::types::Geometry;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Identifies one load attempt. Strictly increasing per controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadToken(u64);

/// What to probe, and the token to report back with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub token: LoadToken,
    pub url: String,
}

/// A finished probe on its way back to the controller.
#[derive(Debug)]
pub struct Completion {
    pub token: LoadToken,
    pub url: String,
    pub result: Result<Dimensions, BackendError>,
}

/// Load state for the tracked url.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOutcome {
    Idle,
    Pending,
    Loaded(Geometry),
    Failed,
}

impl LoadOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Result of [`ImageLoader::start_load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartLoad {
    /// The url is already tracked; nothing was dispatched.
    Unchanged,
    /// A new attempt was dispatched.
    Started(LoadToken),
}

/// Runs (or arranges for) a probe and sends exactly one [`Completion`] to
/// `reply`. Dropping `reply` without sending leaves the attempt pending.
pub trait ProbeDispatch {
    fn dispatch(&self, request: ProbeRequest, reply: Sender<Completion>);
}

/// Runs probes on the rayon global pool.
pub struct PoolDispatch<B> {
    backend: Arc<B>,
}

impl<B: ProbeBackend + 'static> PoolDispatch<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn shared(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

impl<B: ProbeBackend + 'static> ProbeDispatch for PoolDispatch<B> {
    fn dispatch(&self, request: ProbeRequest, reply: Sender<Completion>) {
        let backend = Arc::clone(&self.backend);
        rayon::spawn(move || {
            let result = backend.probe(&request.url);
            // Send fails only when the controller is gone.
            let _ = reply.send(Completion {
                token: request.token,
                url: request.url,
                result,
            });
        });
    }
}

/// A probe request waiting for the host to resolve it.
#[derive(Debug)]
pub struct PendingProbe {
    pub request: ProbeRequest,
    reply: Sender<Completion>,
}

impl PendingProbe {
    /// Report the probe's result. Returns `false` when the controller that
    /// asked for it has been disposed.
    pub fn resolve(self, result: Result<Dimensions, BackendError>) -> bool {
        self.reply
            .send(Completion {
                token: self.request.token,
                url: self.request.url,
                result,
            })
            .is_ok()
    }
}

/// Queues requests for the host instead of running them. Clones share the
/// same queue, so keep one clone and hand the other to the controller.
#[derive(Debug, Clone, Default)]
pub struct DeferredDispatch {
    queue: Rc<RefCell<Vec<PendingProbe>>>,
}

impl DeferredDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain every request dispatched since the last call, oldest first.
    pub fn take_requests(&self) -> Vec<PendingProbe> {
        std::mem::take(&mut *self.queue.borrow_mut())
    }

    pub fn pending_count(&self) -> usize {
        self.queue.borrow().len()
    }
}

impl ProbeDispatch for DeferredDispatch {
    fn dispatch(&self, request: ProbeRequest, reply: Sender<Completion>) {
        self.queue.borrow_mut().push(PendingProbe { request, reply });
    }
}

#[derive(Debug, Clone)]
struct Attempt {
    token: LoadToken,
    url: String,
}

/// Single-slot probe controller. See the [module docs](self).
pub struct ImageLoader<D: ProbeDispatch> {
    dispatch: D,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    current: Option<Attempt>,
    next_token: u64,
    outcome: LoadOutcome,
}

impl<D: ProbeDispatch> ImageLoader<D> {
    pub fn new(dispatch: D) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            dispatch,
            tx,
            rx,
            current: None,
            next_token: 0,
            outcome: LoadOutcome::Idle,
        }
    }

    pub fn outcome(&self) -> LoadOutcome {
        self.outcome
    }

    /// The url of the tracked attempt, if any.
    pub fn current_url(&self) -> Option<&str> {
        self.current.as_ref().map(|a| a.url.as_str())
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatch
    }

    /// Begin probing `url` unless it is already the tracked url.
    ///
    /// A different url abandons the previous attempt and moves to `Pending`.
    pub fn start_load(&mut self, url: &str) -> StartLoad {
        if self.current_url() == Some(url) {
            tracing::trace!(url, "load already tracked");
            return StartLoad::Unchanged;
        }
        StartLoad::Started(self.begin(url))
    }

    /// Start a fresh attempt for the tracked url even if it already
    /// resolved. Returns `None` when nothing is tracked.
    pub fn reload(&mut self) -> Option<LoadToken> {
        let url = self.current.as_ref()?.url.clone();
        Some(self.begin(&url))
    }

    /// Forget the tracked attempt without starting another. Any in-flight
    /// probe is detached.
    pub fn abandon(&mut self) {
        if let Some(previous) = self.current.take() {
            tracing::debug!(url = %previous.url, "load abandoned");
        }
        self.outcome = LoadOutcome::Idle;
    }

    fn begin(&mut self, url: &str) -> LoadToken {
        if let Some(previous) = &self.current {
            if self.outcome.is_pending() {
                tracing::debug!(previous = %previous.url, next = url, "superseding pending load");
            }
        }
        self.next_token += 1;
        let token = LoadToken(self.next_token);
        self.current = Some(Attempt {
            token,
            url: url.to_string(),
        });
        self.outcome = LoadOutcome::Pending;
        tracing::debug!(url, ?token, "probe dispatched");
        self.dispatch.dispatch(
            ProbeRequest {
                token,
                url: url.to_string(),
            },
            self.tx.clone(),
        );
        token
    }

    /// Commit a completion if it belongs to the current pending attempt.
    /// Returns the new outcome when it committed.
    fn apply(&mut self, completion: Completion) -> Option<LoadOutcome> {
        let is_current = self
            .current
            .as_ref()
            .is_some_and(|a| a.token == completion.token);
        if !is_current || !self.outcome.is_pending() {
            tracing::trace!(url = %completion.url, token = ?completion.token, "stale completion dropped");
            return None;
        }
        self.outcome = match completion.result {
            Ok(dims) => {
                tracing::debug!(url = %completion.url, width = dims.width, height = dims.height, "image loaded");
                LoadOutcome::Loaded(dims.into())
            }
            Err(e) => {
                tracing::warn!(url = %completion.url, "image failed to load: {e}");
                LoadOutcome::Failed
            }
        };
        Some(self.outcome)
    }

    /// Apply every completion that has arrived, without blocking. Returns
    /// the committed outcome, if one committed.
    pub fn poll(&mut self) -> Option<LoadOutcome> {
        let mut committed = None;
        while let Ok(completion) = self.rx.try_recv() {
            if let Some(outcome) = self.apply(completion) {
                committed = Some(outcome);
            }
        }
        committed
    }

    /// Block until the current attempt resolves. Returns `None` immediately
    /// when nothing is pending.
    ///
    /// There is no timeout: a probe that never reports back blocks forever.
    /// Use [`wait_timeout`](Self::wait_timeout) when that matters.
    pub fn wait(&mut self) -> Option<LoadOutcome> {
        while self.outcome.is_pending() {
            let completion = self.rx.recv().ok()?;
            if let Some(outcome) = self.apply(completion) {
                return Some(outcome);
            }
        }
        None
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`, leaving the
    /// attempt pending.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<LoadOutcome> {
        let deadline = std::time::Instant::now() + timeout;
        while self.outcome.is_pending() {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(completion) => {
                    if let Some(outcome) = self.apply(completion) {
                        return Some(outcome);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None;
                }
            }
        }
        None
    }

    /// Tear down. In-flight probes can no longer reach this controller.
    pub fn dispose(self) {
        if let Some(attempt) = &self.current {
            if self.outcome.is_pending() {
                tracing::debug!(url = %attempt.url, "disposing with pending load");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;

    fn dims(width: u32, height: u32) -> Result<Dimensions, BackendError> {
        Ok(Dimensions { width, height })
    }

    fn deferred_loader() -> (ImageLoader<DeferredDispatch>, DeferredDispatch) {
        let dispatch = DeferredDispatch::new();
        (ImageLoader::new(dispatch.clone()), dispatch)
    }

    #[test]
    fn starts_idle() {
        let (loader, _) = deferred_loader();
        assert_eq!(loader.outcome(), LoadOutcome::Idle);
        assert_eq!(loader.current_url(), None);
    }

    #[test]
    fn start_load_goes_pending_and_dispatches() {
        let (mut loader, dispatch) = deferred_loader();
        assert!(matches!(loader.start_load("a.jpg"), StartLoad::Started(_)));
        assert_eq!(loader.outcome(), LoadOutcome::Pending);
        let requests = dispatch.take_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].request.url, "a.jpg");
    }

    #[test]
    fn same_url_twice_is_idempotent() {
        let (mut loader, dispatch) = deferred_loader();
        let first = loader.start_load("a.jpg");
        assert_eq!(loader.start_load("a.jpg"), StartLoad::Unchanged);
        assert_eq!(dispatch.pending_count(), 1);
        assert_eq!(loader.outcome(), LoadOutcome::Pending);

        let probe = dispatch.take_requests().pop().unwrap();
        assert_eq!(StartLoad::Started(probe.request.token), first);
        assert!(probe.resolve(dims(10, 5)));
        assert_eq!(
            loader.poll(),
            Some(LoadOutcome::Loaded(Geometry::new(10.0, 5.0)))
        );
    }

    #[test]
    fn same_url_after_load_does_not_reload() {
        let (mut loader, dispatch) = deferred_loader();
        loader.start_load("a.jpg");
        dispatch.take_requests().pop().unwrap().resolve(dims(1, 1));
        loader.poll();
        assert_eq!(loader.start_load("a.jpg"), StartLoad::Unchanged);
        assert_eq!(dispatch.pending_count(), 0);
    }

    #[test]
    fn failure_is_terminal_until_new_source() {
        let (mut loader, dispatch) = deferred_loader();
        loader.start_load("missing.jpg");
        dispatch
            .take_requests()
            .pop()
            .unwrap()
            .resolve(Err(BackendError::ProbeFailed("404".into())));
        assert_eq!(loader.poll(), Some(LoadOutcome::Failed));
        assert_eq!(loader.poll(), None);
        assert_eq!(loader.outcome(), LoadOutcome::Failed);

        loader.start_load("other.jpg");
        assert_eq!(loader.outcome(), LoadOutcome::Pending);
    }

    #[test]
    fn superseded_load_never_overwrites_newer_state() {
        let (mut loader, dispatch) = deferred_loader();
        loader.start_load("x");
        loader.start_load("y");
        let mut requests = dispatch.take_requests();
        let y = requests.pop().unwrap();
        let x = requests.pop().unwrap();
        assert_eq!(x.request.url, "x");

        // y resolves first, then x arrives late
        y.resolve(dims(300, 100));
        assert_eq!(
            loader.poll(),
            Some(LoadOutcome::Loaded(Geometry::new(300.0, 100.0)))
        );
        x.resolve(dims(1, 1));
        assert_eq!(loader.poll(), None);
        assert_eq!(
            loader.outcome(),
            LoadOutcome::Loaded(Geometry::new(300.0, 100.0))
        );
        assert_eq!(loader.current_url(), Some("y"));
    }

    #[test]
    fn superseded_load_resolving_first_is_ignored() {
        let (mut loader, dispatch) = deferred_loader();
        loader.start_load("x");
        loader.start_load("y");
        let mut requests = dispatch.take_requests();
        let y = requests.pop().unwrap();
        let x = requests.pop().unwrap();

        x.resolve(Err(BackendError::ProbeFailed("late".into())));
        assert_eq!(loader.poll(), None);
        assert_eq!(loader.outcome(), LoadOutcome::Pending);

        y.resolve(dims(20, 10));
        assert_eq!(
            loader.poll(),
            Some(LoadOutcome::Loaded(Geometry::new(20.0, 10.0)))
        );
    }

    #[test]
    fn reload_retries_tracked_url() {
        let (mut loader, dispatch) = deferred_loader();
        assert_eq!(loader.reload(), None);
        loader.start_load("flaky.jpg");
        dispatch
            .take_requests()
            .pop()
            .unwrap()
            .resolve(Err(BackendError::ProbeFailed("timeout".into())));
        loader.poll();

        assert!(loader.reload().is_some());
        assert_eq!(loader.outcome(), LoadOutcome::Pending);
        dispatch.take_requests().pop().unwrap().resolve(dims(4, 3));
        assert_eq!(
            loader.poll(),
            Some(LoadOutcome::Loaded(Geometry::new(4.0, 3.0)))
        );
    }

    #[test]
    fn abandon_detaches_pending_probe() {
        let (mut loader, dispatch) = deferred_loader();
        loader.start_load("a.jpg");
        loader.abandon();
        assert_eq!(loader.outcome(), LoadOutcome::Idle);
        dispatch.take_requests().pop().unwrap().resolve(dims(1, 1));
        assert_eq!(loader.poll(), None);
        assert_eq!(loader.outcome(), LoadOutcome::Idle);
    }

    #[test]
    fn disposed_loader_rejects_late_completion() {
        let (mut loader, dispatch) = deferred_loader();
        loader.start_load("a.jpg");
        loader.dispose();
        let probe = dispatch.take_requests().pop().unwrap();
        assert!(!probe.resolve(dims(1, 1)));
    }

    #[test]
    fn wait_returns_none_when_idle() {
        let (mut loader, _) = deferred_loader();
        assert_eq!(loader.wait(), None);
    }

    #[test]
    fn wait_timeout_leaves_unresolved_probe_pending() {
        let (mut loader, _dispatch) = deferred_loader();
        loader.start_load("never.jpg");
        assert_eq!(loader.wait_timeout(Duration::from_millis(10)), None);
        assert_eq!(loader.outcome(), LoadOutcome::Pending);
    }

    #[test]
    fn pool_dispatch_probes_off_thread() {
        let backend = MockBackend::new().with("a.jpg", 272, 92);
        let mut loader = ImageLoader::new(PoolDispatch::new(backend));
        loader.start_load("a.jpg");
        assert_eq!(
            loader.wait_timeout(Duration::from_secs(10)),
            Some(LoadOutcome::Loaded(Geometry::new(272.0, 92.0)))
        );
    }

    #[test]
    fn pool_dispatch_reports_failures() {
        let mut loader = ImageLoader::new(PoolDispatch::new(MockBackend::new()));
        loader.start_load("missing.jpg");
        assert_eq!(
            loader.wait_timeout(Duration::from_secs(10)),
            Some(LoadOutcome::Failed)
        );
    }

    #[test]
    fn pool_dispatch_last_started_wins() {
        let backend = MockBackend::new()
            .with("x", 10, 10)
            .with("y", 30, 10);
        let mut loader = ImageLoader::new(PoolDispatch::new(backend));
        loader.start_load("x");
        loader.start_load("y");
        let outcome = loader.wait_timeout(Duration::from_secs(10));
        assert_eq!(outcome, Some(LoadOutcome::Loaded(Geometry::new(30.0, 10.0))));
    }
}
