//! DriftSync CLI - Pull a local store up to date from a remote.
//!
//! The remote is a JSON fixture file that is re-read on every run, and the
//! local store is a directory of JSON table documents.

mod records;
mod remote;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use driftsync_common::Record;
use driftsync_store::{FileStore, LocalStore};
use driftsync_sync::{read_watermark, to_local, GroupSync, SyncConfig, SyncCoordinator, Tags};

use records::{Company, Note, Person};
use remote::{FixtureRemote, Session};

#[derive(Parser)]
#[command(name = "driftsync")]
#[command(about = "DriftSync - Incremental pull sync")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// JSON file with sync settings.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull remote changes into the local store.
    Sync {
        /// Remote fixture file.
        #[arg(short, long)]
        remote: PathBuf,

        /// Local store directory.
        #[arg(short, long)]
        store: PathBuf,

        /// Only sync kinds registered under this tag.
        #[arg(short, long, conflicts_with = "kind")]
        tag: Option<String>,

        /// Only sync this entity set, e.g. "People".
        #[arg(short, long)]
        kind: Option<String>,
    },

    /// Show record counts and watermarks of a local store.
    Status {
        /// Local store directory.
        #[arg(short, long)]
        store: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Sync {
            remote,
            store,
            tag,
            kind,
        } => cmd_sync(config, &remote, &store, tag.as_deref(), kind.as_deref()).await,

        Commands::Status { store } => cmd_status(&config, &store),
    }
}

/// Read settings, falling back to defaults without a file.
fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    let Some(path) = path else {
        return Ok(SyncConfig::default());
    };

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
}

/// Build a sealed coordinator with every kind the fixture serves.
fn build_coordinator(
    config: SyncConfig,
    remote: FixtureRemote,
    store: FileStore,
) -> Result<SyncCoordinator<Session, FileStore>> {
    let mut coordinator = SyncCoordinator::new(store, move || remote.connect(), config);

    coordinator
        .register::<Person, _, _>(
            remote::changed_people,
            remote::deleted_people,
            Tags::of(["crm"]).with_default(),
        )
        .context("Failed to register people")?;
    coordinator
        .register::<Company, _, _>(
            remote::changed_companies,
            remote::deleted_companies,
            Tags::of(["crm"]).with_default(),
        )
        .context("Failed to register companies")?;
    coordinator
        .register_deletable::<Note, _>(remote::changed_notes, Tags::of(["notes"]).with_default())
        .context("Failed to register notes")?;

    coordinator.initialize()?;
    Ok(coordinator)
}

/// Pull changes.
async fn cmd_sync(
    config: SyncConfig,
    remote: &Path,
    store: &Path,
    tag: Option<&str>,
    kind: Option<&str>,
) -> Result<()> {
    info!("Syncing {} from {}", store.display(), remote.display());

    let fixture = FixtureRemote::new(remote, config.page_policy());
    let store = FileStore::new(store).context("Failed to open local store")?;
    let coordinator = build_coordinator(config, fixture, store)?;

    match kind {
        Some(name) => {
            let count = coordinator
                .sync_entity_set(name)
                .await
                .with_context(|| format!("Failed to sync {}", name))?;
            println!("{}: {} changes", name, count);
        }
        None => match coordinator.sync(tag).await.context("Sync failed")? {
            GroupSync::Completed(count) => println!("Synced {} changes", count),
            GroupSync::UnknownTag => {
                anyhow::bail!("Unknown tag: {}", tag.unwrap_or_default());
            }
            GroupSync::AlreadyRunning => println!("A sync is already running"),
        },
    }

    print_status(&coordinator.config().watermark_key, coordinator.store())
}

/// Show local state.
fn cmd_status(config: &SyncConfig, store: &Path) -> Result<()> {
    if !store.is_dir() {
        anyhow::bail!("No local store at {}", store.display());
    }

    let store = FileStore::new(store).context("Failed to open local store")?;
    print_status(&config.watermark_key, &store)
}

fn print_status(watermark_key: &str, store: &FileStore) -> Result<()> {
    println!("Local store: {}", store.root().display());
    print_kind::<Person>(watermark_key, store)?;
    print_kind::<Company>(watermark_key, store)?;
    print_kind::<Note>(watermark_key, store)?;
    Ok(())
}

fn print_kind<R: Record>(watermark_key: &str, store: &FileStore) -> Result<()> {
    let table = store
        .table::<R>()
        .with_context(|| format!("Failed to open {} table", R::ENTITY_SET))?;
    let watermark = read_watermark(table.as_ref(), watermark_key)?;

    match watermark {
        Some(ts) => println!(
            "  {:<10} {:>6} records, synced through {}",
            R::ENTITY_SET,
            table.count()?,
            to_local(ts).to_rfc3339()
        ),
        None => println!(
            "  {:<10} {:>6} records, never synced",
            R::ENTITY_SET,
            table.count()?
        ),
    }

    Ok(())
}
