//! RPC error types

use std::time::Duration;
use thiserror::Error;

use crate::message::CallId;

/// Errors surfaced to callers of the controller
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Procedure not found: {name}")]
    NotFound { name: String },

    #[error("Call {id} to '{name}' timed out after {timeout:?}")]
    Timeout { id: CallId, name: String, timeout: Duration },

    #[error("Routing unavailable: {0}")]
    RoutingUnavailable(String),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Too many pending calls ({pending}, max {max})")]
    Overloaded { pending: usize, max: usize },

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Call cancelled before settlement")]
    Cancelled,

    #[error("No Tokio runtime available to run the call")]
    NoRuntime,
}

impl RpcError {
    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::Timeout { .. })
    }

    /// Check if the caller may reasonably retry
    ///
    /// The controller never retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Timeout { .. } => true,
            RpcError::Transport(_) => true,
            RpcError::Overloaded { .. } => true,
            RpcError::NotFound { .. } => false,
            RpcError::RoutingUnavailable(_) => false,
            RpcError::Remote(_) => false,
            RpcError::Serialization(_) => false,
            RpcError::Cancelled => false,
            RpcError::NoRuntime => false,
        }
    }
}
