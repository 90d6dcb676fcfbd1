//! IIIF Presentation CLI
//!
//! ## Usage
//!
//! ```bash
//! # Create or update a Manifest from a request file
//! iiif-presentation upsert request.json
//!
//! # Fold a processing result into a staged Manifest
//! iiif-presentation complete-ingest ingest.json
//!
//! # Show a stored Manifest, its rows and document
//! iiif-presentation show --customer 1 my-manifest
//!
//! # List a customer's Manifests
//! iiif-presentation list --customer 1
//!
//! # Delete a Manifest
//! iiif-presentation --storage-dir /data/iiif delete --customer 1 my-manifest
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tokio::time::{timeout, Duration};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use iiif_presentation::services::spawn_logging_listener;
use iiif_presentation::{CompleteIngestRequest, Config, Services, UpsertManifestRequest};

const LISTENER_DRAIN: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "iiif-presentation")]
#[command(about = "Canvas painting reconciliation and Manifest storage")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "IIIF_PRESENTATION_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "IIIF_PRESENTATION_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or update a Manifest from a JSON request file
    Upsert {
        request: PathBuf,
    },

    /// Apply a JSON ingest result to a staged Manifest
    CompleteIngest {
        request: PathBuf,
    },

    /// Print a stored Manifest
    Show {
        #[arg(long)]
        customer: i32,
        manifest_id: String,
    },

    /// List a customer's Manifest ids
    List {
        #[arg(long)]
        customer: i32,
    },

    /// Delete a Manifest and its documents
    Delete {
        #[arg(long)]
        customer: i32,
        manifest_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("iiif_presentation=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }

    tokio::fs::create_dir_all(&config.storage_dir).await?;
    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let services = Services::open(&config).await?;
    let listener = spawn_logging_listener(services.events.clone());

    let outcome = run(args.command, &services).await;

    // Dropping the services closes the event bus; the listener logs what is
    // still queued and then stops
    drop(services);
    if timeout(LISTENER_DRAIN, listener).await.is_err() {
        debug!("Event listener did not drain in time");
    }

    outcome
}

async fn run(command: Command, services: &Services) -> anyhow::Result<()> {
    match command {
        Command::Upsert { request } => {
            let request: UpsertManifestRequest = read_json(&request)?;
            let saved = services.manifests.upsert(request).await?;
            print_json(&saved)?;
        }
        Command::CompleteIngest { request } => {
            let request: CompleteIngestRequest = read_json(&request)?;
            let saved = services.manifests.complete_ingest(request).await?;
            print_json(&saved)?;
        }
        Command::Show { customer, manifest_id } => {
            let view = services.manifests.get(customer, &manifest_id).await?;
            print_json(&view)?;
        }
        Command::List { customer } => {
            let ids = services.manifests.list(customer).await?;
            print_json(&ids)?;
        }
        Command::Delete { customer, manifest_id } => {
            services.manifests.delete(customer, &manifest_id).await?;
            info!(customer, manifest_id = %manifest_id, "Deleted manifest");
        }
    }

    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
