//! Configuration management
//!
//! Loaded from a TOML file; every field has a default so a missing file or
//! a partial one is fine. CLI flags and `MEMSYNC_*` env vars override the
//! file (see `cli.rs`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Digest budget, schedule and file locations
    #[serde(default)]
    pub sync: SyncConfig,
    /// External summarizer used by the compactor
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    /// Where issue snapshots come from
    #[serde(default)]
    pub source: SourceConfig,
    /// Crash/backoff policy for background loops
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Hard character budget for the digest
    #[serde(default = "default_max_digest_chars")]
    pub max_digest_chars: usize,
    /// Seconds between sync cycles
    #[serde(default = "default_sync_interval")]
    pub sync_interval_seconds: u64,
    /// Digest output path (defaults to the data dir)
    #[serde(default)]
    pub digest_path: Option<PathBuf>,
    /// Sync state path (defaults to the data dir)
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

fn default_max_digest_chars() -> usize {
    4000
}

fn default_sync_interval() -> u64 {
    3600
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_digest_chars: default_max_digest_chars(),
            sync_interval_seconds: default_sync_interval(),
            digest_path: None,
            state_path: None,
        }
    }
}

/// Summarizer backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarizerBackend {
    /// External executable (prompt on stdin, bullets on stdout)
    Command,
    /// OpenRouter chat completions over HTTP
    OpenRouter,
    /// Skip the model tier
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    #[serde(default = "default_backend")]
    pub backend: SummarizerBackend,
    /// Executable for the command backend
    #[serde(default = "default_command")]
    pub command: String,
    /// Arguments; `{model}` and `{budget}` are substituted per call
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Model identifier (a cheap tier is enough)
    #[serde(default = "default_model")]
    pub model: String,
    /// Wall-clock limit per summarization
    #[serde(default = "default_summarizer_timeout")]
    pub timeout_secs: u64,
    /// Base URL for the openrouter backend
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_backend() -> SummarizerBackend {
    SummarizerBackend::Command
}

fn default_command() -> String {
    "claude".to_string()
}

fn default_args() -> Vec<String> {
    vec!["-p".to_string(), "--model".to_string(), "{model}".to_string()]
}

fn default_model() -> String {
    "haiku".to_string()
}

fn default_summarizer_timeout() -> u64 {
    120
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            command: default_command(),
            args: default_args(),
            model: default_model(),
            timeout_secs: default_summarizer_timeout(),
            base_url: default_base_url(),
        }
    }
}

/// Issue source selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// `gh issue list` against a GitHub repository
    Gh,
    /// A JSON snapshot file written by another process
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_kind")]
    pub kind: SourceKind,
    /// Label selecting learning issues
    #[serde(default = "default_label")]
    pub label: String,
    /// `owner/name`; the current directory's repo when unset
    #[serde(default)]
    pub repo: Option<String>,
    /// Snapshot path for the file source
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    /// Maximum issues fetched per cycle
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Wall-clock limit for fetching a snapshot
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
}

fn default_source_kind() -> SourceKind {
    SourceKind::Gh
}

fn default_label() -> String {
    "learning".to_string()
}

fn default_limit() -> usize {
    500
}

fn default_fetch_timeout() -> u64 {
    60
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: default_source_kind(),
            label: default_label(),
            repo: None,
            snapshot_path: None,
            limit: default_limit(),
            timeout_secs: default_fetch_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// First backoff after a crash
    #[serde(default = "default_base_backoff")]
    pub base_backoff_secs: u64,
    /// Backoff cap; the loop interval when unset
    #[serde(default)]
    pub max_backoff_secs: Option<u64>,
}

fn default_base_backoff() -> u64 {
    5
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            base_backoff_secs: default_base_backoff(),
            max_backoff_secs: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load configuration from a file, falling back to defaults when it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;
        crate::memory::atomic_write(path, contents.as_bytes())
    }

    /// Resolved digest output path
    pub fn digest_path(&self) -> Result<PathBuf> {
        match &self.sync.digest_path {
            Some(p) => Ok(p.clone()),
            None => Ok(data_dir()?.join("LEARNINGS_DIGEST.md")),
        }
    }

    /// Resolved sync state path
    pub fn state_path(&self) -> Result<PathBuf> {
        match &self.sync.state_path {
            Some(p) => Ok(p.clone()),
            None => Ok(data_dir()?.join("memory_sync_state.json")),
        }
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "memsync", "memsync")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "memsync", "memsync")
        .context("Failed to get project directories")?;
    Ok(base.data_dir().to_path_buf())
}
