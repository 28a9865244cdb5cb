//! Registry - procedure bindings keyed by name
//!
//! Async and sync procedures live in independent namespaces, so one name may
//! carry a binding in each. Re-registering a name replaces the prior binding.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::procedure::{AsyncProcedure, SyncProcedure};

/// Procedure storage for one execution context
#[derive(Default)]
pub struct Registry {
    async_procedures: HashMap<String, Arc<dyn AsyncProcedure>>,
    sync_procedures: HashMap<String, Arc<dyn SyncProcedure>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a fire-and-forget procedure under `name`
    pub fn register_async_procedure(&mut self, name: impl Into<String>, procedure: impl AsyncProcedure + 'static) {
        let name = name.into();
        debug!(%name, "Registry::register_async_procedure: called");
        if self.async_procedures.insert(name.clone(), Arc::new(procedure)).is_some() {
            warn!(%name, "Replaced existing async procedure");
        }
    }

    /// Bind a value-returning procedure under `name`
    pub fn register_sync_procedure(&mut self, name: impl Into<String>, procedure: impl SyncProcedure + 'static) {
        let name = name.into();
        debug!(%name, "Registry::register_sync_procedure: called");
        if self.sync_procedures.insert(name.clone(), Arc::new(procedure)).is_some() {
            warn!(%name, "Replaced existing sync procedure");
        }
    }

    pub fn resolve_async(&self, name: &str) -> Option<Arc<dyn AsyncProcedure>> {
        self.async_procedures.get(name).cloned()
    }

    pub fn resolve_sync(&self, name: &str) -> Option<Arc<dyn SyncProcedure>> {
        self.sync_procedures.get(name).cloned()
    }

    pub fn has_async(&self, name: &str) -> bool {
        self.async_procedures.contains_key(name)
    }

    pub fn has_sync(&self, name: &str) -> bool {
        self.sync_procedures.contains_key(name)
    }

    /// Names of all bound procedures, sorted, as (async, sync)
    pub fn procedure_names(&self) -> (Vec<String>, Vec<String>) {
        let mut async_names: Vec<String> = self.async_procedures.keys().cloned().collect();
        let mut sync_names: Vec<String> = self.sync_procedures.keys().cloned().collect();
        async_names.sort();
        sync_names.sort();
        (async_names, sync_names)
    }
}
