//! 🗂️ Destination Cache: a snapshot of what already lives at the destination.
//!
//! Built once per resource type, right before the first write, and owned by that
//! type's apply pass. Never global, never shared between runs. It's a lookup table
//! from match key to live destination instance, and that's all it will ever be.
//!
//! A missing entry is cheap: at worst we try a create that didn't need to happen.
//! So building it is best-effort, and a hiccup on one entry is a warning, not a crisis.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::ClientError;

#[derive(Debug, Default, Clone)]
pub struct DestinationCache {
    entries: HashMap<String, Value>,
}

impl DestinationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 🏗️ Index a destination listing. Instances without a key are left out.
    pub fn index<F>(instances: Vec<Value>, key_of: F) -> Self
    where
        F: Fn(&Value) -> Option<String>,
    {
        let entries = instances
            .into_iter()
            .filter_map(|instance| key_of(&instance).map(|key| (key, instance)))
            .collect();
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: String, instance: Value) {
        self.entries.insert(key, instance);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 🔍 Fold one individual lookup into the cache.
    ///
    /// Found: cached. 404: the object isn't there, debug and move on.
    /// Anything else: warn and leave the entry out.
    pub fn absorb_lookup(&mut self, resource_type: &str, key: &str, result: Result<Value, ClientError>) {
        match result {
            Ok(instance) => self.insert(key.to_string(), instance),
            Err(e) if e.is_not_found() => {
                debug!("🔍 {} '{}' not found at destination", resource_type, key);
            }
            Err(e) => {
                warn!(
                    "⚠️ Couldn't look up {} '{}' at destination, leaving it out of the cache: {}",
                    resource_type, key, e
                );
            }
        }
    }
}
