//! Controller - call correlation and inbound dispatch for one context
//!
//! Outbound:
//! - **call_async:** fire-and-forget, no bookkeeping
//! - **call_sync:** pending-call record + timer, settled by `receive` or timeout
//!
//! Inbound:
//! - **no_reply:** async middleware, then the async procedure
//! - **reply:** sync middleware, then the sync procedure, then a result envelope
//!
//! The controller never touches a transport. Every outbound envelope goes
//! through a send function supplied by the adapter for that call.
//!
//! Every pending-table mutation (insert on issue, remove on result or
//! timeout) happens under the one `calls` mutex. The registry, middleware
//! lists and browser binding have their own locks; none of them is ever held
//! while `calls` is taken. A pending record is removed under the table lock
//! before it is settled, so exactly one of {result, timeout} wins and
//! anything arriving later is dropped.
//!
//! Timers and handlers run on the Tokio runtime captured at construction, so
//! the inbound entry points may be called from any thread.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::config::ControllerConfig;
use crate::error::RpcError;
use crate::message::{CallId, CallResult, Request, Source};
use crate::middleware::{Middleware, run_chain};
use crate::procedure::{AsyncProcedure, SyncProcedure};
use crate::registry::Registry;

/// Pending sync call tracking
struct PendingCall {
    name: String,
    reply_tx: oneshot::Sender<Result<Value, RpcError>>,
    timer: AbortHandle,
}

/// Controller metrics for observability
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerMetrics {
    pub pending_calls: usize,
    pub calls_sent: u64,
    pub results_received: u64,
    pub late_results: u64,
    pub timeouts: u64,
    pub requests_handled: u64,
    pub requests_rejected: u64,
    pub procedures_not_found: u64,
}

#[derive(Default)]
struct CallTable {
    pending: HashMap<CallId, PendingCall>,
    metrics: ControllerMetrics,
}

struct Inner {
    context: Source,
    config: ControllerConfig,
    runtime: Option<Handle>,
    registry: RwLock<Registry>,
    async_middleware: RwLock<Vec<Arc<dyn Middleware>>>,
    sync_middleware: RwLock<Vec<Arc<dyn Middleware>>>,
    calls: Mutex<CallTable>,
    next_id: AtomicU64,
    browser_id: Mutex<Option<u32>>,
}

impl Inner {
    /// Captured runtime, else whichever runtime the caller is inside
    fn runtime(&self) -> Option<Handle> {
        self.runtime.clone().or_else(|| Handle::try_current().ok())
    }
}

/// Call controller for one execution context
///
/// Cheap to clone; clones share the same registry and pending table.
/// `call_sync`, `no_reply` and `reply` spawn onto the runtime captured by
/// [`new`](Self::new) or given to [`with_handle`](Self::with_handle).
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(rw: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    rw.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(rw: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    rw.write().unwrap_or_else(PoisonError::into_inner)
}

impl Controller {
    /// Create a controller bound to the current Tokio runtime, if any
    ///
    /// Outside a runtime the controller still accepts registrations and
    /// inbound envelopes, but cannot run procedures or time calls; use
    /// [`with_handle`](Self::with_handle) there.
    pub fn new(context: Source, config: ControllerConfig) -> Self {
        let runtime = Handle::try_current().ok();
        if runtime.is_none() {
            warn!(%context, "Controller created outside a Tokio runtime");
        }
        Self::build(context, config, runtime)
    }

    /// Create a controller that spawns onto `handle`
    pub fn with_handle(context: Source, config: ControllerConfig, handle: Handle) -> Self {
        Self::build(context, config, Some(handle))
    }

    fn build(context: Source, config: ControllerConfig, runtime: Option<Handle>) -> Self {
        info!(%context, "Controller created");
        Self {
            inner: Arc::new(Inner {
                context,
                config,
                runtime,
                registry: RwLock::new(Registry::new()),
                async_middleware: RwLock::new(Vec::new()),
                sync_middleware: RwLock::new(Vec::new()),
                calls: Mutex::new(CallTable::default()),
                next_id: AtomicU64::new(1),
                browser_id: Mutex::new(None),
            }),
        }
    }

    /// The context this controller lives in
    pub fn context(&self) -> Source {
        self.inner.context
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    // === Registration ===

    pub fn register_async_procedure(&self, name: impl Into<String>, procedure: impl AsyncProcedure + 'static) {
        write(&self.inner.registry).register_async_procedure(name, procedure);
    }

    pub fn register_sync_procedure(&self, name: impl Into<String>, procedure: impl SyncProcedure + 'static) {
        write(&self.inner.registry).register_sync_procedure(name, procedure);
    }

    /// Append to the async middleware chain
    pub fn register_async_middleware(&self, middleware: impl Middleware + 'static) {
        debug!("Controller::register_async_middleware: called");
        write(&self.inner.async_middleware).push(Arc::new(middleware));
    }

    /// Append to the sync middleware chain
    pub fn register_sync_middleware(&self, middleware: impl Middleware + 'static) {
        debug!("Controller::register_sync_middleware: called");
        write(&self.inner.sync_middleware).push(Arc::new(middleware));
    }

    /// Names of bound procedures as (async, sync)
    pub fn procedure_names(&self) -> (Vec<String>, Vec<String>) {
        read(&self.inner.registry).procedure_names()
    }

    // === UI routing ===

    /// Bind the browser instance id used to route replies to this UI context
    pub fn bind_browser(&self, browser_id: u32) {
        debug!(browser_id, "Controller::bind_browser: called");
        *lock(&self.inner.browser_id) = Some(browser_id);
    }

    pub fn unbind_browser(&self) {
        debug!("Controller::unbind_browser: called");
        *lock(&self.inner.browser_id) = None;
    }

    pub fn browser_id(&self) -> Option<u32> {
        *lock(&self.inner.browser_id)
    }

    // === Outbound ===

    fn next_id(&self) -> CallId {
        CallId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Fire a one-way call through `send`
    ///
    /// No pending record is created. A failing `send` is reported here and
    /// not retried.
    pub fn call_async<A, S>(&self, name: &str, send: S, args: A) -> Result<(), RpcError>
    where
        A: Serialize,
        S: FnOnce(Request) -> eyre::Result<()>,
    {
        let args = serde_json::to_value(args)?;
        let request = Request::new(name, self.next_id(), self.inner.context, args);
        debug!(%name, id = %request.id, "Controller::call_async: called");

        send(request).map_err(|e| {
            warn!(%name, error = %e, "Async call send failed");
            RpcError::Transport(e.to_string())
        })?;

        lock(&self.inner.calls).metrics.calls_sent += 1;
        Ok(())
    }

    /// Issue a call through `send` and await its result
    ///
    /// The returned future resolves when `receive` is handed a result with
    /// the same id, or fails with [`RpcError::Timeout`] once `timeout` elapses.
    /// Calls from [`Source::Cef`] need a bound browser id; without one the
    /// future fails immediately and `send` is never invoked.
    pub fn call_sync<A, R, S>(&self, name: &str, timeout: Duration, source: Source, send: S, args: A) -> SyncCall<R>
    where
        A: Serialize,
        R: DeserializeOwned,
        S: FnOnce(Request) -> eyre::Result<()>,
    {
        debug!(%name, ?timeout, %source, "Controller::call_sync: called");

        let args = match serde_json::to_value(args) {
            Ok(args) => args,
            Err(e) => return SyncCall::failed(e.into()),
        };

        let mut request = Request::new(name, self.next_id(), source, args);
        if source == Source::Cef {
            match self.browser_id() {
                Some(browser_id) => request = request.with_browser_id(browser_id),
                None => {
                    warn!(%name, "No browser id bound, cannot route reply");
                    return SyncCall::failed(RpcError::RoutingUnavailable("no browser id bound".to_string()));
                }
            }
        }

        let id = request.id;
        let (reply_tx, reply_rx) = oneshot::channel();

        {
            let mut calls = lock(&self.inner.calls);
            let pending = calls.pending.len();
            let max = self.inner.config.max_pending_calls;
            if pending >= max {
                warn!(%name, pending, max, "Too many pending calls, refusing new call");
                return SyncCall::failed(RpcError::Overloaded { pending, max });
            }

            // Spawned under the table lock so the record and its timer appear together
            let Some(timer) = spawn_timer(&self.inner, id, timeout) else {
                warn!(%name, "No Tokio runtime to time the call");
                return SyncCall::failed(RpcError::NoRuntime);
            };
            calls.pending.insert(
                id,
                PendingCall {
                    name: name.to_string(),
                    reply_tx,
                    timer,
                },
            );
        }

        debug!(%id, "Controller::call_sync: sending request");
        match send(request) {
            Ok(()) => lock(&self.inner.calls).metrics.calls_sent += 1,
            Err(e) => {
                warn!(%name, %id, error = %e, "Sync call send failed");
                // The send may have settled the call before failing
                if let Some(pending) = self.take_pending(id) {
                    pending.timer.abort();
                    let _ = pending.reply_tx.send(Err(RpcError::Transport(e.to_string())));
                }
            }
        }

        SyncCall::waiting(id, reply_rx)
    }

    /// [`call_sync`](Self::call_sync) with the configured default timeout
    pub fn call_sync_default<A, R, S>(&self, name: &str, source: Source, send: S, args: A) -> SyncCall<R>
    where
        A: Serialize,
        R: DeserializeOwned,
        S: FnOnce(Request) -> eyre::Result<()>,
    {
        self.call_sync(name, self.inner.config.default_timeout(), source, send, args)
    }

    fn runtime(&self) -> Option<Handle> {
        self.inner.runtime()
    }

    fn take_pending(&self, id: CallId) -> Option<PendingCall> {
        lock(&self.inner.calls).pending.remove(&id)
    }

    // === Inbound ===

    /// Handle an inbound fire-and-forget request
    ///
    /// Absent requests, rejected requests and unknown procedures are dropped.
    /// Procedure failures are logged and never reach the caller.
    pub fn no_reply(&self, request: Option<Request>) {
        let Some(mut request) = request else {
            debug!("Controller::no_reply: ignoring absent request");
            return;
        };
        debug!(name = %request.name, id = %request.id, source = %request.source, "Controller::no_reply: called");

        let chain = read(&self.inner.async_middleware).clone();
        if let Err(rejection) = run_chain(&chain, &mut request) {
            info!(name = %request.name, %rejection, "Async request rejected by middleware");
            lock(&self.inner.calls).metrics.requests_rejected += 1;
            return;
        }

        let procedure = read(&self.inner.registry).resolve_async(&request.name);
        let Some(procedure) = procedure else {
            warn!(name = %request.name, "Async procedure not found, dropping request");
            lock(&self.inner.calls).metrics.procedures_not_found += 1;
            return;
        };
        let Some(runtime) = self.runtime() else {
            error!(name = %request.name, "No Tokio runtime to run async procedure, dropping request");
            return;
        };
        lock(&self.inner.calls).metrics.requests_handled += 1;

        let name = request.name;
        let args = request.args;
        runtime.spawn(async move {
            match AssertUnwindSafe(procedure.invoke(args)).catch_unwind().await {
                Ok(Ok(())) => debug!(%name, "Async procedure completed"),
                Ok(Err(e)) => warn!(%name, error = %e, "Async procedure failed"),
                Err(_) => error!(%name, "Async procedure panicked"),
            }
        });
    }

    /// Handle an inbound request that expects a result
    ///
    /// A result envelope is always handed to `reply_send`, even when the
    /// procedure is unknown, rejected by middleware, fails or panics.
    pub fn reply<F>(&self, request: Option<Request>, reply_send: F)
    where
        F: FnOnce(CallResult) -> eyre::Result<()> + Send + 'static,
    {
        let Some(mut request) = request else {
            debug!("Controller::reply: ignoring absent request");
            return;
        };
        debug!(name = %request.name, id = %request.id, source = %request.source, "Controller::reply: called");
        let id = request.id;

        let chain = read(&self.inner.sync_middleware).clone();
        if let Err(rejection) = run_chain(&chain, &mut request) {
            info!(name = %request.name, %rejection, "Sync request rejected by middleware");
            lock(&self.inner.calls).metrics.requests_rejected += 1;
            deliver(reply_send, CallResult::error(id, format!("rejected: {}", rejection)));
            return;
        }

        let procedure = read(&self.inner.registry).resolve_sync(&request.name);
        let Some(procedure) = procedure else {
            warn!(name = %request.name, "Sync procedure not found");
            lock(&self.inner.calls).metrics.procedures_not_found += 1;
            let err = RpcError::NotFound { name: request.name };
            deliver(reply_send, CallResult::error(id, err.to_string()));
            return;
        };
        let Some(runtime) = self.runtime() else {
            error!(name = %request.name, "No Tokio runtime to run sync procedure");
            deliver(reply_send, CallResult::error(id, RpcError::NoRuntime.to_string()));
            return;
        };
        lock(&self.inner.calls).metrics.requests_handled += 1;

        let name = request.name;
        let args = request.args;
        runtime.spawn(async move {
            let result = match AssertUnwindSafe(procedure.invoke(args)).catch_unwind().await {
                Ok(Ok(value)) => CallResult::ok(id, value),
                Ok(Err(e)) => {
                    warn!(%name, error = %e, "Sync procedure failed");
                    CallResult::error(id, format!("{:#}", e))
                }
                Err(_) => {
                    error!(%name, "Sync procedure panicked");
                    CallResult::error(id, format!("procedure '{}' panicked", name))
                }
            };
            deliver(reply_send, result);
        });
    }

    /// Settle a pending call with an inbound result
    ///
    /// Absent results and results with no pending record are dropped.
    pub fn receive(&self, result: Option<CallResult>) {
        let Some(result) = result else {
            debug!("Controller::receive: ignoring absent result");
            return;
        };
        debug!(id = %result.id, is_error = result.is_error(), "Controller::receive: called");

        let pending = {
            let mut calls = lock(&self.inner.calls);
            let pending = calls.pending.remove(&result.id);
            if pending.is_some() {
                calls.metrics.results_received += 1;
            } else {
                calls.metrics.late_results += 1;
            }
            pending
        };

        let Some(pending) = pending else {
            debug!(id = %result.id, "No pending call for result, dropping");
            return;
        };

        pending.timer.abort();
        let outcome = match result.error {
            Some(message) => Err(RpcError::Remote(message)),
            None => Ok(result.value),
        };
        if pending.reply_tx.send(outcome).is_err() {
            debug!(id = %result.id, name = %pending.name, "Caller dropped before result arrived");
        }
    }

    // === Introspection ===

    /// Number of sync calls awaiting a result
    pub fn pending_count(&self) -> usize {
        lock(&self.inner.calls).pending.len()
    }

    /// Snapshot of controller metrics
    pub fn metrics(&self) -> ControllerMetrics {
        let calls = lock(&self.inner.calls);
        ControllerMetrics {
            pending_calls: calls.pending.len(),
            ..calls.metrics.clone()
        }
    }
}

/// Hand a result envelope to the adapter, logging transport failures
fn deliver<F>(reply_send: F, result: CallResult)
where
    F: FnOnce(CallResult) -> eyre::Result<()>,
{
    let id = result.id;
    if let Err(e) = reply_send(result) {
        warn!(%id, error = %e, "Failed to send result");
    }
}

fn spawn_timer(inner: &Arc<Inner>, id: CallId, timeout: Duration) -> Option<AbortHandle> {
    let runtime = inner.runtime()?;
    let weak: Weak<Inner> = Arc::downgrade(inner);
    let task = runtime.spawn(async move {
        tokio::time::sleep(timeout).await;
        if let Some(inner) = weak.upgrade() {
            expire(&inner, id, timeout);
        }
    });
    Some(task.abort_handle())
}

fn expire(inner: &Inner, id: CallId, timeout: Duration) {
    let pending = {
        let mut calls = lock(&inner.calls);
        let pending = calls.pending.remove(&id);
        if pending.is_some() {
            calls.metrics.timeouts += 1;
        }
        pending
    };

    if let Some(pending) = pending {
        warn!(%id, name = %pending.name, ?timeout, "Call timed out");
        let _ = pending.reply_tx.send(Err(RpcError::Timeout {
            id,
            name: pending.name,
            timeout,
        }));
    }
}

enum CallState {
    Failed(Option<RpcError>),
    Waiting(oneshot::Receiver<Result<Value, RpcError>>),
}

/// Future returned by [`Controller::call_sync`]
///
/// Resolves to the decoded result value. Dropping it does not cancel the
/// call; the record is still cleared by its result or its timeout.
#[must_use = "a sync call does nothing useful unless awaited"]
pub struct SyncCall<R> {
    id: Option<CallId>,
    state: CallState,
    _result: PhantomData<fn() -> R>,
}

impl<R> SyncCall<R> {
    fn failed(err: RpcError) -> Self {
        Self {
            id: None,
            state: CallState::Failed(Some(err)),
            _result: PhantomData,
        }
    }

    fn waiting(id: CallId, rx: oneshot::Receiver<Result<Value, RpcError>>) -> Self {
        Self {
            id: Some(id),
            state: CallState::Waiting(rx),
            _result: PhantomData,
        }
    }

    /// Correlation id of the call, if it got far enough to be issued
    pub fn id(&self) -> Option<CallId> {
        self.id
    }
}

impl<R: DeserializeOwned> Future for SyncCall<R> {
    type Output = Result<R, RpcError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            CallState::Failed(err) => Poll::Ready(Err(err.take().unwrap_or(RpcError::Cancelled))),
            CallState::Waiting(rx) => match Pin::new(rx).poll(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(Ok(Ok(value))) => Poll::Ready(serde_json::from_value(value).map_err(RpcError::from)),
                Poll::Ready(Ok(Err(e))) => Poll::Ready(Err(e)),
                Poll::Ready(Err(_)) => Poll::Ready(Err(RpcError::Cancelled)),
            },
        }
    }
}
