//! Creel: job execution and progress-streaming engine for web scraping.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use creel::config::{Config, LogFormat};
use creel::engine::retention;
use creel::engine::store::FileJobStore;
use creel::engine::JobEngine;
use creel::http::HttpServer;
use creel::tasks::shop_reel::{HttpPlacesDirectory, PlacesDirectory};
use creel::tasks::{HttpFetcher, TaskRegistry};

#[derive(Parser)]
#[command(name = "creel")]
#[command(about = "Job execution engine for web scraping with live progress streaming")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "creel.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon
    Serve {
        /// Override the configured listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Write a default configuration file
    Init {
        /// Output directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

fn init_logging(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    match config.logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };

    init_logging(&config)?;

    match cli.command {
        Commands::Serve { listen } => serve(config, listen).await,
        Commands::Init { path } => init_config(path),
    }
}

async fn serve(mut config: Config, listen: Option<String>) -> Result<()> {
    if let Some(addr) = listen {
        config.http.listen_addr = addr;
    }
    config.validate()?;

    std::fs::create_dir_all(&config.storage.data_dir)
        .context("Failed to create data directory")?;
    std::fs::create_dir_all(config.reports_dir())
        .context("Failed to create reports directory")?;

    let store: Arc<dyn creel::engine::store::JobStore> =
        Arc::new(FileJobStore::open(config.jobs_dir())?);

    let fetcher = Arc::new(HttpFetcher::new(&config.scraping)?);
    let directory: Option<Arc<dyn PlacesDirectory>> = match &config.scraping.places_endpoint {
        Some(endpoint) => {
            let url = Url::parse(endpoint).context("Invalid places endpoint URL")?;
            let dir = HttpPlacesDirectory::new(
                url,
                &config.scraping.user_agent,
                Duration::from_secs(config.scraping.request_timeout_secs),
            )?;
            Some(Arc::new(dir))
        }
        None => {
            info!("No places endpoint configured, shop_reel jobs will fail fast");
            None
        }
    };

    let registry = TaskRegistry::with_default_tasks(
        fetcher,
        directory,
        config.scraping.max_sites_per_job,
    );

    let engine = Arc::new(JobEngine::new(store, registry, config.reports_dir()));

    // Jobs left non-terminal by a previous process are settled as failed
    // before we accept new work.
    match engine.recover_interrupted() {
        Ok(0) => info!("Clean shutdown detected, no recovery needed"),
        Ok(n) => warn!("Recovered from unclean shutdown: {n} interrupted job(s) marked failed"),
        Err(e) => error!("Job recovery failed: {e}"),
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    tokio::spawn(retention::sweep_loop(
        engine.store().clone(),
        engine.progress().clone(),
        config.retention.clone(),
        config.reports_dir(),
    ));

    let server = HttpServer::new(config.http.clone(), engine.clone());
    let shutdown_rx = shutdown_tx.subscribe();
    let server_handle = tokio::spawn(async move {
        match server.run(shutdown_rx).await {
            Ok(()) => info!("HTTP server shut down cleanly"),
            Err(e) => error!("HTTP server failed: {e}"),
        }
    });

    info!("Daemon running, data directory: {}", config.storage.data_dir.display());

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = wait_for_sigterm() => {
            info!("Received SIGTERM, shutting down");
        }
    }

    let _ = shutdown_tx.send(());
    let abort = server_handle.abort_handle();
    if tokio::time::timeout(Duration::from_secs(5), server_handle)
        .await
        .is_err()
    {
        warn!("HTTP server did not shut down within 5s, aborting");
        abort.abort();
    }

    info!("Daemon stopped");
    Ok(())
}

fn init_config(path: PathBuf) -> Result<()> {
    std::fs::create_dir_all(&path)?;
    let config_path = path.join("creel.toml");
    if config_path.exists() {
        anyhow::bail!("Config file already exists: {}", config_path.display());
    }
    let config = Config::default();
    let content = toml::to_string_pretty(&config)?;
    std::fs::write(&config_path, content)?;
    println!("Wrote default configuration to {}", config_path.display());
    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await;
}
