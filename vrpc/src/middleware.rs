//! Middleware for inbound requests
//!
//! Middleware runs in registration order before the procedure is resolved.
//! Each middleware receives the request and a continuation ([`Next`]):
//!
//! - Pass through by calling `next.run(request)`, optionally after mutating
//!   the request or performing side effects
//! - Short-circuit by returning `Err(Rejection)` without calling `next`
//!
//! The only way to obtain a [`Proceed`] is from the continuation, so a
//! middleware cannot skip the rest of the chain and still dispatch.
//!
//! ```ignore
//! controller.register_sync_middleware(middleware::from_fn(|request: &mut Request, next: Next<'_>| {
//!     if request.name.starts_with("admin.") && request.source != Source::Server {
//!         return Err(Rejection::new("admin procedures are server-only"));
//!     }
//!     next.run(request)
//! }));
//! ```

use std::fmt;
use std::sync::Arc;

use crate::message::Request;

/// Proof that the whole chain ran and the request should be dispatched
#[derive(Debug)]
pub struct Proceed(());

/// Reason a middleware stopped a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: String,
}

impl Rejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Interceptor applied to inbound requests before dispatch
///
/// Middleware is synchronous: the controller never suspends while walking
/// the chain.
pub trait Middleware: Send + Sync {
    fn handle(&self, request: &mut Request, next: Next<'_>) -> Result<Proceed, Rejection>;
}

/// Continuation over the remaining middleware
pub struct Next<'a> {
    rest: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Middleware>]) -> Self {
        Self { rest: chain }
    }

    /// Run the remainder of the chain
    pub fn run(self, request: &mut Request) -> Result<Proceed, Rejection> {
        match self.rest.split_first() {
            Some((head, rest)) => head.handle(request, Next { rest }),
            None => Ok(Proceed(())),
        }
    }
}

/// Middleware built from a closure
pub struct FnMiddleware<F> {
    f: F,
}

/// Wrap a closure as a [`Middleware`]
pub fn from_fn<F>(f: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(&mut Request, Next<'a>) -> Result<Proceed, Rejection> + Send + Sync + 'static,
{
    FnMiddleware { f }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&mut Request, Next<'a>) -> Result<Proceed, Rejection> + Send + Sync + 'static,
{
    fn handle(&self, request: &mut Request, next: Next<'_>) -> Result<Proceed, Rejection> {
        (self.f)(request, next)
    }
}

/// Run a full chain over a request
pub(crate) fn run_chain(chain: &[Arc<dyn Middleware>], request: &mut Request) -> Result<Proceed, Rejection> {
    Next::new(chain).run(request)
}
