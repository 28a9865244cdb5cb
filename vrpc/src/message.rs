//! Envelope types exchanged between contexts
//!
//! These are the values handed to the transport-specific send functions and
//! received back from adapters. Keys are PascalCase on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The execution context a call originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Embedded browser UI layer
    Cef,
    /// Local client-side script context
    Client,
    /// Remote server-side script context
    Server,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Source::Cef => "cef",
            Source::Client => "client",
            Source::Server => "server",
        };
        f.write_str(name)
    }
}

/// Correlation id assigned by the issuing controller
///
/// Only unique within one controller instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(pub u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outbound request envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Request {
    pub name: String,
    pub id: CallId,
    pub source: Source,

    /// Browser instance a reply must be routed back to (UI-originated calls only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_id: Option<u32>,

    #[serde(default)]
    pub args: Value,
}

impl Request {
    pub fn new(name: impl Into<String>, id: CallId, source: Source, args: Value) -> Self {
        Self {
            name: name.into(),
            id,
            source,
            browser_id: None,
            args,
        }
    }

    /// Stamp the browser instance id used to route the reply
    pub fn with_browser_id(mut self, browser_id: u32) -> Self {
        self.browser_id = Some(browser_id);
        self
    }
}

/// Result envelope sent back for a synchronous call
///
/// Carries either a value or an error string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallResult {
    pub id: CallId,

    #[serde(default)]
    pub value: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallResult {
    /// Successful result
    pub fn ok(id: CallId, value: Value) -> Self {
        Self { id, value, error: None }
    }

    /// Failed result
    pub fn error(id: CallId, message: impl Into<String>) -> Self {
        Self {
            id,
            value: Value::Null,
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
