//! 🧳 Run contexts: everything one reconciliation run owns, handed to adapters
//! explicitly instead of living in statics.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};

use crate::cache::DestinationCache;
use crate::client::ApiClient;
use crate::errors::EngineError;
use crate::state::StateStore;

/// 🧳 Per-run: both accounts and the State Store.
///
/// The state lock is only ever held for bookkeeping, never across a network call.
#[derive(Debug)]
pub struct SyncContext {
    source: Arc<dyn ApiClient>,
    destination: Arc<dyn ApiClient>,
    state: Mutex<StateStore>,
}

impl SyncContext {
    pub fn new(
        source: Arc<dyn ApiClient>,
        destination: Arc<dyn ApiClient>,
        state: StateStore,
    ) -> Self {
        Self {
            source,
            destination,
            state: Mutex::new(state),
        }
    }

    pub fn source(&self) -> &dyn ApiClient {
        self.source.as_ref()
    }

    pub fn destination(&self) -> &dyn ApiClient {
        self.destination.as_ref()
    }

    pub async fn state(&self) -> MutexGuard<'_, StateStore> {
        self.state.lock().await
    }

    /// 🔒 The last-known destination instance for `identity`.
    ///
    /// Update and delete target the destination through this. If it's missing, the
    /// create phase never ran for this identity, and that is an ordering bug.
    pub async fn destination_entry(
        &self,
        resource_type: &str,
        identity: &str,
    ) -> Result<Value, EngineError> {
        self.state()
            .await
            .destination(resource_type)
            .get(identity)
            .cloned()
            .ok_or_else(|| EngineError::MissingDestinationState {
                resource_type: resource_type.to_string(),
                identity: identity.to_string(),
            })
    }

    pub async fn record_destination(&self, resource_type: &str, identity: &str, instance: Value) {
        self.state()
            .await
            .destination_mut(resource_type)
            .insert(identity.to_string(), instance);
    }

    pub async fn forget_destination(&self, resource_type: &str, identity: &str) -> Option<Value> {
        self.state()
            .await
            .destination_mut(resource_type)
            .remove(identity)
    }

    pub fn into_state(self) -> StateStore {
        self.state.into_inner()
    }
}

/// 🎯 Per resource type, per apply pass: the run plus that type's fresh cache.
#[derive(Debug, Clone, Copy)]
pub struct ApplyContext<'a> {
    pub run: &'a SyncContext,
    pub cache: &'a DestinationCache,
}

impl<'a> ApplyContext<'a> {
    pub fn new(run: &'a SyncContext, cache: &'a DestinationCache) -> Self {
        Self { run, cache }
    }

    pub fn destination(&self) -> &'a dyn ApiClient {
        self.run.destination()
    }
}
