//! 💾 State: the durable memory of what we've seen and what we've written.
//!
//! Two maps per resource type, keyed by identity:
//! - `source`: the last import of the source account
//! - `destination`: what THIS tool last wrote to the destination
//!
//! An entry in `destination` means the object exists over there because we put it
//! there. It is born on create, overwritten on update, and removed on delete.
//! The in-memory `StateStore` is pure bookkeeping; `StateStorage` decides where
//! it lives between runs.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

/// 📦 identity → last-known instance. Sorted so the files diff nicely.
pub type ResourceMap = BTreeMap<String, Value>;

static EMPTY: ResourceMap = BTreeMap::new();

/// 🧠 Both sides of the ledger, for every resource type.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StateStore {
    source: HashMap<String, ResourceMap>,
    destination: HashMap<String, ResourceMap>,
}

impl StateStore {
    pub fn source(&self, resource_type: &str) -> &ResourceMap {
        self.source.get(resource_type).unwrap_or(&EMPTY)
    }

    pub fn destination(&self, resource_type: &str) -> &ResourceMap {
        self.destination.get(resource_type).unwrap_or(&EMPTY)
    }

    pub fn source_mut(&mut self, resource_type: &str) -> &mut ResourceMap {
        self.source.entry(resource_type.to_string()).or_default()
    }

    pub fn destination_mut(&mut self, resource_type: &str) -> &mut ResourceMap {
        self.destination
            .entry(resource_type.to_string())
            .or_default()
    }

    /// 🔄 A fresh import replaces the whole source side for that type.
    pub fn replace_source(&mut self, resource_type: &str, resources: ResourceMap) {
        self.source.insert(resource_type.to_string(), resources);
    }
}

/// 🗄️ Where state goes to sleep between runs.
#[async_trait]
pub trait StateStorage: Send + Sync + fmt::Debug {
    /// Load both sides for the given types. Nothing saved yet is not an error.
    async fn load(&self, resource_types: &[&str]) -> Result<StateStore>;

    /// Persist both sides of ONE type.
    async fn save(&self, state: &StateStore, resource_type: &str) -> Result<()>;
}

/// 📁 `<dir>/source/<type>.json` and `<dir>/destination/<type>.json`, pretty-printed.
#[derive(Debug, Clone)]
pub struct LocalStateStorage {
    dir: PathBuf,
}

impl LocalStateStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_for(&self, side: &str, resource_type: &str) -> PathBuf {
        self.dir.join(side).join(format!("{resource_type}.json"))
    }
}

async fn read_map(path: &Path) -> Result<ResourceMap> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => serde_json::from_str(&contents).with_context(|| {
            format!(
                "💀 State file '{}' is not a JSON object of identity -> resource. Did someone hand-edit it?",
                path.display()
            )
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("📁 No state at '{}' yet, starting empty", path.display());
            Ok(ResourceMap::new())
        }
        Err(e) => {
            Err(e).with_context(|| format!("💀 Failed to read state file '{}'", path.display()))
        }
    }
}

async fn write_map(path: &Path, map: &ResourceMap) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("💀 Failed to create state dir '{}'", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(map).context("💀 Failed to serialize state")?;

    // -- 🔒 write then rename, so a crash mid-write never leaves half a file
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .with_context(|| format!("💀 Failed to write state file '{}'", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("💀 Failed to move state file into '{}'", path.display()))
}

#[async_trait]
impl StateStorage for LocalStateStorage {
    async fn load(&self, resource_types: &[&str]) -> Result<StateStore> {
        let mut state = StateStore::default();
        for resource_type in resource_types {
            let source = read_map(&self.file_for("source", resource_type)).await?;
            let destination = read_map(&self.file_for("destination", resource_type)).await?;
            state.replace_source(resource_type, source);
            *state.destination_mut(resource_type) = destination;
        }
        Ok(state)
    }

    async fn save(&self, state: &StateStore, resource_type: &str) -> Result<()> {
        write_map(
            &self.file_for("source", resource_type),
            state.source(resource_type),
        )
        .await?;
        write_map(
            &self.file_for("destination", resource_type),
            state.destination(resource_type),
        )
        .await?;
        debug!(
            "💾 Saved state for {} ({} source, {} destination)",
            resource_type,
            state.source(resource_type).len(),
            state.destination(resource_type).len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn the_one_where_state_survives_a_nap() {
        let dir = tempfile::tempdir().expect("💀 tempdir");
        let storage = LocalStateStorage::new(dir.path());

        let mut state = StateStore::default();
        state.source_mut("slack_integration_channels").insert(
            "ws:#alerts".into(),
            json!({"name": "#alerts", "display": {"tags": ["a", "b"], "nested": {"x": 1}}}),
        );
        state
            .destination_mut("slack_integration_channels")
            .insert("ws:#alerts".into(), json!({"name": "#alerts"}));
        storage
            .save(&state, "slack_integration_channels")
            .await
            .expect("💀 save");

        assert!(dir.path().join("source/slack_integration_channels.json").exists());
        assert!(dir.path().join("destination/slack_integration_channels.json").exists());

        let loaded = storage
            .load(&["slack_integration_channels"])
            .await
            .expect("💀 load");
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn the_one_where_nothing_saved_means_nothing_loaded() {
        let dir = tempfile::tempdir().expect("💀 tempdir");
        let storage = LocalStateStorage::new(dir.path().join("never-created"));

        let loaded = storage.load(&["aws_integration"]).await.expect("💀 load");
        assert!(loaded.source("aws_integration").is_empty());
        assert!(loaded.destination("aws_integration").is_empty());
    }

    #[tokio::test]
    async fn the_one_where_a_mangled_file_is_reported_not_swallowed() {
        let dir = tempfile::tempdir().expect("💀 tempdir");
        std::fs::create_dir_all(dir.path().join("source")).expect("💀 mkdir");
        std::fs::write(dir.path().join("source/aws_integration.json"), "[not, json")
            .expect("💀 write");

        let storage = LocalStateStorage::new(dir.path());
        assert!(storage.load(&["aws_integration"]).await.is_err());
    }

    #[test]
    fn the_one_where_replacing_source_forgets_the_old_import() {
        let mut state = StateStore::default();
        state.source_mut("t").insert("old".into(), json!({}));
        let mut fresh = ResourceMap::new();
        fresh.insert("new".into(), json!({}));
        state.replace_source("t", fresh);
        assert!(state.source("t").contains_key("new"));
        assert!(!state.source("t").contains_key("old"));
        assert!(state.destination("t").is_empty());
    }
}
