//! 🚀 dsync-cli: the front door. Parses flags, sets up logging, loads config,
//! and hands the real work to `dsync::run`. Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 🔁 Copy integrations and catalog entries from one account to another.
#[derive(Parser, Debug)]
#[command(name = "dsync", version)]
struct Cli {
    /// TOML config file. DSYNC_* environment variables are always read too.
    #[arg(long, short, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Read the source account into local state.
    Import,
    /// Write local source state to the destination account.
    Sync {
        /// Also delete destination objects that are gone from the source.
        #[arg(long)]
        cleanup: bool,
    },
    /// Import, then sync.
    Migrate {
        #[arg(long)]
        cleanup: bool,
    },
    /// Show what sync would change, without changing it.
    Diffs,
}

impl From<CliCommand> for dsync::Command {
    fn from(command: CliCommand) -> Self {
        match command {
            CliCommand::Import => dsync::Command::Import,
            CliCommand::Sync { cleanup } => dsync::Command::Sync { cleanup },
            CliCommand::Migrate { cleanup } => dsync::Command::Migrate { cleanup },
            CliCommand::Diffs => dsync::Command::Diffs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // -- 📡 RUST_LOG wins; otherwise info, so a plain run still says what it did
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        let exists = path.try_exists().with_context(|| {
            format!(
                "💀 Couldn't check whether the config file exists. Was checking here: '{}'",
                path.display()
            )
        })?;
        if !exists {
            anyhow::bail!(
                "💀 Config file '{}' doesn't exist. Relative paths are relative to where you ran dsync, \
                 not to where dsync lives.",
                path.display()
            );
        }
    }

    let app_config = dsync::app_config::load_config(cli.config.as_deref())
        .context("💀 Couldn't load the config. Check the file and the DSYNC_* variables.")?;

    if let Err(err) = dsync::run(app_config, cli.command.into()).await {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion, one layer at a time
        let mut looks_like_connectivity = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("error sending request")
                || cause_str.contains("never made it to the other side")
                || cause_str.contains("connection refused")
                || cause_str.contains("Connection refused")
                || cause_str.contains("tcp connect error")
                || cause_str.contains("dns error")
            {
                looks_like_connectivity = true;
            }
        }

        if looks_like_connectivity {
            error!(
                "🔧 hint: an API endpoint wasn't reachable. Check `api_url` for both accounts \
                 (scheme included, e.g. https://api.datadoghq.eu), your proxy settings, and \
                 whether this machine can reach the internet at all."
            );
        }

        std::process::exit(1);
    }

    Ok(())
}
