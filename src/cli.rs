//! CLI interface for memsync

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{self, Config, SourceKind};
use crate::gateway::supervisor::{LoopConfig, LoopSupervisor};
use crate::memory::SyncStateTracker;
use crate::orchestrator::bus::BroadcastBus;
use crate::sync::{source, MemorySyncWorker};

#[derive(Parser)]
#[command(name = "memsync")]
#[command(about = "Consolidate agent-run learnings into a bounded memory digest", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true, env = "MEMSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Hard character budget for the digest
    #[arg(long, global = true, env = "MEMSYNC_MAX_DIGEST_CHARS")]
    max_digest_chars: Option<usize>,

    /// Seconds between sync cycles
    #[arg(long, global = true, env = "MEMSYNC_SYNC_INTERVAL_SECONDS")]
    sync_interval_seconds: Option<u64>,

    /// Model identifier passed to the summarizer
    #[arg(long, global = true, env = "MEMSYNC_SUMMARIZER_MODEL")]
    summarizer_model: Option<String>,

    /// Issue label selecting learnings
    #[arg(long, global = true, env = "MEMSYNC_LABEL")]
    label: Option<String>,

    /// Read issues from a JSON snapshot file instead of `gh`
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the supervised sync loop until interrupted
    Run,
    /// Run a single sync cycle and print its stats
    Sync,
    /// Show the last sync state
    Status,
    /// Print the current digest
    Digest,
    /// Show or initialise configuration
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
}

impl Cli {
    fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(p) => Ok(p.clone()),
            None => config::config_path(),
        }
    }

    /// Load the config file and layer CLI/env overrides on top
    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_from(&self.config_path()?)?;
        self.apply_overrides(&mut config);
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut Config) {
        if let Some(max) = self.max_digest_chars {
            config.sync.max_digest_chars = max;
        }
        if let Some(secs) = self.sync_interval_seconds {
            config.sync.sync_interval_seconds = secs;
        }
        if let Some(model) = &self.summarizer_model {
            config.summarizer.model = model.clone();
        }
        if let Some(label) = &self.label {
            config.source.label = label.clone();
        }
        if let Some(path) = &self.snapshot {
            config.source.kind = SourceKind::File;
            config.source.snapshot_path = Some(path.clone());
        }
    }
}

/// Parse arguments and run the selected command
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run => run_daemon(cli.load_config()?).await,
        Commands::Sync => {
            let config = cli.load_config()?;
            let worker = MemorySyncWorker::from_config(&config)?;
            let source = source::from_config(&config.source)?;
            let stats = worker.sync_once(source.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Commands::Status => {
            let config = cli.load_config()?;
            let tracker = SyncStateTracker::new(config.state_path()?);
            let state = tracker.get_state()?;
            println!("State file:   {}", tracker.path().display());
            println!("Digest file:  {}", config.digest_path()?.display());
            println!("Tracked ids:  {}", state.tracked_ids.len());
            println!(
                "Digest hash:  {}",
                if state.digest_hash.is_empty() { "(none)" } else { state.digest_hash.as_str() }
            );
            match state.last_synced_at {
                Some(ts) => println!("Last synced:  {}", ts.to_rfc3339()),
                None => println!("Last synced:  never"),
            }
            Ok(())
        }
        Commands::Digest => {
            let config = cli.load_config()?;
            let path = config.digest_path()?;
            let digest = std::fs::read_to_string(&path)
                .with_context(|| format!("No digest at {} (run `memsync sync` first)", path.display()))?;
            print!("{}", digest);
            Ok(())
        }
        Commands::Config { show, init } => {
            let path = cli.config_path()?;
            if *init {
                if path.exists() {
                    println!("Config already exists at {}", path.display());
                } else {
                    Config::default().save_to(&path)?;
                    println!("Wrote default config to {}", path.display());
                }
            }
            if *show || !*init {
                let config = cli.load_config()?;
                println!("# {}", path.display());
                print!("{}", toml::to_string_pretty(&config)?);
            }
            Ok(())
        }
    }
}

/// Run the memory-sync loop under supervision until Ctrl-C
async fn run_daemon(config: Config) -> Result<()> {
    let bus = Arc::new(BroadcastBus::default());
    let worker = Arc::new(MemorySyncWorker::from_config(&config)?.with_bus(bus.clone()));
    let source: Arc<dyn source::IssueSource> = Arc::from(source::from_config(&config.source)?);

    let interval = Duration::from_secs(config.sync.sync_interval_seconds);
    let max_backoff = config
        .supervisor
        .max_backoff_secs
        .map(Duration::from_secs)
        .unwrap_or(interval);
    let loop_config = LoopConfig::new(interval)
        .with_backoff(Duration::from_secs(config.supervisor.base_backoff_secs), max_backoff);

    let mut supervisor = LoopSupervisor::new();
    let token = supervisor.shutdown_token();

    // Surface bus traffic in the log
    let mut events = bus.subscribe();
    let listener_token = token.clone();
    let listener = tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => info!(event_type = %event.event_type, data = %event.data, "Bus event"),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "Bus listener lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
                _ = listener_token.cancelled() => break,
            }
        }
    });

    supervisor
        .spawn_loop("memory-sync", loop_config, move || {
            let worker = worker.clone();
            let source = source.clone();
            async move {
                let stats = worker.sync_once(source.as_ref()).await?;
                Ok::<_, anyhow::Error>(format!("{} ({} items)", stats.action, stats.item_count))
            }
        })
        .await?;

    info!(
        interval_secs = config.sync.sync_interval_seconds,
        max_chars = config.sync.max_digest_chars,
        "memsync running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Interrupt received");

    supervisor.shutdown().await;
    let _ = listener.await;
    Ok(())
}
