//! Loopback transport between two controllers in one process
//!
//! Stands in for the host event bus: every envelope is encoded to a JSON
//! string and decoded on the other side, exactly as an adapter would do when
//! crossing a real context boundary. Used by the demo command and tests.

use eyre::{Context, Result};
use tracing::debug;

use crate::controller::Controller;
use crate::message::{CallResult, Request};

fn encode<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("Failed to encode envelope")
}

fn decode<T: serde::de::DeserializeOwned>(wire: &str) -> Result<T> {
    serde_json::from_str(wire).context("Failed to decode envelope")
}

/// One-directional link from a calling controller to a remote one
///
/// Results of sync calls travel back over the same link.
#[derive(Clone)]
pub struct Link {
    local: Controller,
    remote: Controller,
}

impl Link {
    pub fn new(local: &Controller, remote: &Controller) -> Self {
        debug!(local = %local.context(), remote = %remote.context(), "Link::new: called");
        Self {
            local: local.clone(),
            remote: remote.clone(),
        }
    }

    /// Send function for `call_async`: delivers into the remote `no_reply`
    pub fn send_async(&self) -> impl FnOnce(Request) -> Result<()> + Send + 'static {
        let remote = self.remote.clone();
        move |request| {
            let wire = encode(&request)?;
            debug!(%wire, "Link: async request");
            remote.no_reply(Some(decode(&wire)?));
            Ok(())
        }
    }

    /// Send function for `call_sync`: delivers into the remote `reply` and
    /// routes the result back into the local `receive`
    pub fn send_sync(&self) -> impl FnOnce(Request) -> Result<()> + Send + 'static {
        let local = self.local.clone();
        let remote = self.remote.clone();
        move |request| {
            let wire = encode(&request)?;
            debug!(%wire, "Link: sync request");
            let request: Request = decode(&wire)?;
            remote.reply(Some(request), move |result: CallResult| {
                let wire = encode(&result)?;
                debug!(%wire, "Link: result");
                local.receive(Some(decode(&wire)?));
                Ok(())
            });
            Ok(())
        }
    }
}
