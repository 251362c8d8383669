//! 🔁 dsync: copy platform configuration from one account to another and keep it there.
//!
//! The binary is a thin shell around [`run`]. Everything interesting lives in
//! [`engine`]; the adapters that know each API's quirks live in [`resources`].

pub mod app_config;
pub mod cache;
pub mod client;
pub mod context;
pub mod diff;
pub mod engine;
pub mod errors;
pub mod filters;
pub mod identity;
pub mod pagination;
mod progress;
pub mod report;
pub mod resources;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::app_config::AppConfig;
use crate::client::HttpClient;
use crate::context::SyncContext;
use crate::engine::{Engine, EngineOptions};
use crate::state::{LocalStateStorage, StateStorage};

/// 🎬 What the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Refresh the source side of the State Store.
    Import,
    /// Push the source side to the destination account.
    Sync { cleanup: bool },
    /// Import, then sync.
    Migrate { cleanup: bool },
    /// Show what sync would change. Touches nothing.
    Diffs,
}

/// 🚀 One run, start to finish.
///
/// Returns `Err` when anything failed along the way, so the exit code tells the
/// truth even when most of the run went fine.
pub async fn run(config: AppConfig, command: Command) -> Result<()> {
    let backends = config.sync.backends()?;
    let filters = config.sync.filter_set()?;
    let resource_types: Vec<&str> = backends.iter().map(|b| b.resource_type()).collect();

    let connect_timeout = Duration::from_secs(config.runtime.connect_timeout_secs);
    let timeout = Duration::from_secs(config.runtime.http_timeout_secs);
    let source = HttpClient::new(&config.source, connect_timeout, timeout)
        .context("💀 Couldn't set up the source account client")?;
    let destination = HttpClient::new(&config.destination, connect_timeout, timeout)
        .context("💀 Couldn't set up the destination account client")?;

    let storage = Arc::new(LocalStateStorage::new(config.sync.state_dir.clone()));
    let state = storage.load(&resource_types).await.with_context(|| {
        format!(
            "💀 Couldn't load saved state from '{}'",
            config.sync.state_dir.display()
        )
    })?;

    let engine = Engine::new(
        SyncContext::new(Arc::new(source), Arc::new(destination), state),
        storage,
        filters,
        EngineOptions {
            max_workers: config.runtime.max_workers,
            show_progress: true,
        },
    );

    let report = match command {
        Command::Import => engine.import(&backends).await?,
        Command::Sync { cleanup } => {
            engine
                .sync(&backends, cleanup || config.sync.cleanup)
                .await?
        }
        Command::Migrate { cleanup } => {
            engine
                .migrate(&backends, cleanup || config.sync.cleanup)
                .await?
        }
        Command::Diffs => {
            let entries = engine.diffs(&backends).await;
            if entries.is_empty() {
                info!("✅ No differences. The two accounts are in agreement.");
            }
            for entry in &entries {
                info!("{}", entry);
            }
            return Ok(());
        }
    };

    info!("📋 Run summary\n{}", report);
    if !report.is_clean() {
        bail!(
            "💀 {} operation(s) or resource type(s) failed, see the log above",
            report.failures()
        );
    }
    Ok(())
}
