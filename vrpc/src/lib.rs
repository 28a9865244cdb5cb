//! vrpc - cross-context RPC bridge
//!
//! Three isolated execution contexts (the embedded browser UI, the local
//! client scripts and the remote server scripts) can only exchange named,
//! serialized events. vrpc gives each context one [`Controller`] that:
//!
//! - Fires one-way calls into another context (`call_async`)
//! - Issues calls that await a typed result with timeout and correlation (`call_sync`)
//! - Exposes named procedures other contexts can invoke (`no_reply` / `reply`)
//!
//! Transports stay outside: adapters hand the controller a send function per
//! call and feed inbound envelopes to its entry points.
//!
//! # Modules
//!
//! - [`controller`] - Call correlation, timeouts and inbound dispatch
//! - [`registry`] - Procedure bindings
//! - [`procedure`] - Procedure traits and closure adapters
//! - [`middleware`] - Inbound interceptors
//! - [`message`] - Envelope types
//! - [`loopback`] - In-process transport for demos and tests
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod loopback;
pub mod message;
pub mod middleware;
pub mod procedure;
pub mod registry;

// Re-export commonly used types
pub use config::{Config, ControllerConfig};
pub use controller::{Controller, ControllerMetrics, SyncCall};
pub use error::RpcError;
pub use loopback::Link;
pub use message::{CallId, CallResult, Request, Source};
pub use middleware::{Middleware, Next, Proceed, Rejection};
pub use procedure::{AsyncProcedure, SyncProcedure, async_fn, async_future_fn, sync_fn, sync_future_fn};
pub use registry::Registry;
