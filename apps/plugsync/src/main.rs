mod config;
mod requests;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use config::AppConfig;
use plugsync_core::{EngineConfig, InstallLedger, UpdateEngine};
use plugsync_sources::CatalogRegistry;

#[derive(Parser)]
#[command(name = "plugsync")]
#[command(about = "plugsync: keeps game-server plugins current across remote catalogs")]
struct Cli {
    #[arg(long, default_value = "plugsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Update every plugin recorded in the request list.
    Update,
    /// Install plugins and record them in the request list.
    Add {
        #[arg(required = true)]
        plugins: Vec<String>,
    },
    /// Remove plugins from the install ledger.
    Remove {
        #[arg(required = true)]
        plugins: Vec<String>,
    },
    /// Show installed plugins and the newest version each source offers.
    List,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli.config)?;

    let ledger = Arc::new(
        InstallLedger::load(cfg.ledger_path())
            .with_context(|| format!("failed to load install ledger {}", cfg.ledger_path()))?,
    );
    let http_timeout = Duration::from_secs(cfg.http_timeout_seconds());
    let registry =
        CatalogRegistry::new(http_timeout).context("failed to build catalog registry")?;
    let engine = UpdateEngine::new(
        registry,
        ledger,
        EngineConfig {
            plugin_dir: PathBuf::from(cfg.plugin_dir()),
            chown: cfg.ownership(),
            http_timeout,
        },
    )
    .context("failed to build update engine")?;

    match cli.command {
        Commands::Update => {
            let list = requests::load_request_list(cfg.requests_path().as_ref())?;
            if list.is_empty() {
                println!("no plugins recorded in {}", cfg.requests_path());
                return Ok(());
            }
            debug!("updating {} plugin(s)", list.len());
            engine.update(list);
            finish(&engine).await
        }
        Commands::Add { plugins } => {
            let parsed = requests::parse_requests(&plugins)?;
            engine.update(parsed.clone());
            let ok = engine.wait().await;
            if !ok {
                bail!("one or more plugins failed to install");
            }
            // Only successful batches are recorded for future updates.
            requests::merge_request_list(cfg.requests_path().as_ref(), &parsed)?;
            Ok(())
        }
        Commands::Remove { plugins } => {
            let parsed = requests::parse_requests(&plugins)?;
            engine.remove(parsed);
            finish(&engine).await
        }
        Commands::List => {
            engine.list();
            finish(&engine).await
        }
    }
}

async fn finish<R: plugsync_core::SourceRegistry + 'static>(
    engine: &UpdateEngine<R>,
) -> Result<()> {
    if engine.wait().await {
        Ok(())
    } else {
        bail!("one or more plugin operations failed")
    }
}
