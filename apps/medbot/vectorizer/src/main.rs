//! MedBot Vectorizer
//!
//! Embeds patient records into per-namespace vector collections and answers
//! semantic queries over them.

use std::sync::Arc;

use axum_helpers::server::shutdown_signal;
use clap::{Parser, Subcommand};
use core_config::tracing::{init_tracing, install_color_eyre};
use domain_vectorization::{Namespace, SearchRequest, VectorizationService};
use eyre::Result;
use strum::IntoEnumIterator;
use tracing::warn;

use medbot_vectorizer::config::Config;
use medbot_vectorizer::{pipeline, scheduler, server};

#[derive(Parser)]
#[command(name = "medbot-vectorizer")]
#[command(about = "Vectorize patient records and serve semantic search")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve,

    /// Run a one-time sync
    Sync {
        /// Namespace to sync (full_profile, demographic). Defaults to all.
        #[arg(short, long)]
        namespace: Option<Namespace>,

        /// Re-embed every record, ignoring the watermark
        #[arg(short, long)]
        force: bool,
    },

    /// Run a semantic query and print the matches
    Search {
        query: String,

        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        #[arg(short, long)]
        threshold: Option<f32>,

        #[arg(short, long, default_value = "full_profile")]
        namespace: Namespace,
    },

    /// Run incremental syncs on a schedule
    Schedule {
        /// Cron expression for scheduling (default: every 15 minutes)
        #[arg(short, long, default_value = "0 */15 * * * *")]
        cron: String,
    },

    /// Show collections, sync state and backend health
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let config = Config::from_env()?;
    init_tracing(&config.environment);

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => server::serve(config).await,
        Commands::Sync { namespace, force } => {
            with_pipeline(&config, |service| sync(service, namespace, force)).await
        }
        Commands::Search {
            query,
            top_k,
            threshold,
            namespace,
        } => {
            let request = SearchRequest {
                query,
                top_k,
                threshold,
                namespace,
                include_metadata: true,
                filter: None,
            };
            with_pipeline(&config, |service| search(service, request)).await
        }
        Commands::Schedule { cron } => {
            with_pipeline(&config, |service| async move {
                scheduler::run_scheduled(service, &cron).await
            })
            .await
        }
        Commands::Status => with_pipeline(&config, status).await,
    }
}

/// Build the pipeline, run `command` against it, then close the database
async fn with_pipeline<F, Fut>(config: &Config, command: F) -> Result<()>
where
    F: FnOnce(Arc<VectorizationService>) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let pipeline::Pipeline { service, db } = pipeline::build(config).await?;

    let outcome = command(service).await;

    if let Err(e) = db.close().await {
        warn!(error = %e, "Error closing PostgreSQL");
    }
    outcome
}

async fn sync(
    service: Arc<VectorizationService>,
    namespace: Option<Namespace>,
    force: bool,
) -> Result<()> {
    // Ctrl-C stops dispatching; finished batches keep their watermark
    let signal_service = Arc::clone(&service);
    let watcher = tokio::spawn(async move {
        shutdown_signal().await;
        if let Err(e) = signal_service.shutdown().await {
            warn!(error = %e, "Failed to flush index after interrupt");
        }
    });

    let report = medbot_vectorizer::sync::run_sync(&service, namespace, force).await;
    watcher.abort();

    // Print what finished and flush before surfacing a failure
    println!("{}", serde_json::to_string_pretty(&report.results)?);
    service.shutdown().await?;

    match report.into_error() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn search(service: Arc<VectorizationService>, request: SearchRequest) -> Result<()> {
    let response = service.search(request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn status(service: Arc<VectorizationService>) -> Result<()> {
    let mut sync = Vec::new();
    for namespace in Namespace::iter() {
        sync.push(service.sync_status(namespace).await?);
    }

    let status = serde_json::json!({
        "collections": service.collections().await?,
        "sync": sync,
        "health": service.health().await,
    });
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
