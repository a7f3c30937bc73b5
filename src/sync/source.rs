//! Issue snapshot sources
//!
//! The tracker is an external collaborator; a source just hands back the
//! full current list of raw issue objects. Parsing and validation happen in
//! [`crate::types::parse_snapshot`].

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

use crate::config::{SourceConfig, SourceKind};

/// Supplies the full current snapshot of learning issues
#[async_trait]
pub trait IssueSource: Send + Sync {
    /// Fetch every current item as raw JSON
    async fn fetch(&self) -> Result<Vec<serde_json::Value>>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Reads a JSON array of issues from a file
pub struct SnapshotFileSource {
    path: PathBuf,
}

impl SnapshotFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl IssueSource for SnapshotFileSource {
    async fn fetch(&self) -> Result<Vec<serde_json::Value>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read snapshot {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Snapshot {} is not a JSON array", self.path.display()))
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// Lists labelled issues through the GitHub CLI
pub struct GhCliSource {
    label: String,
    repo: Option<String>,
    limit: usize,
    timeout: Duration,
}

impl GhCliSource {
    pub fn new(label: impl Into<String>, repo: Option<String>, limit: usize, timeout: Duration) -> Self {
        Self {
            label: label.into(),
            repo,
            limit,
            timeout,
        }
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec![
            "issue".to_string(),
            "list".to_string(),
            "--label".to_string(),
            self.label.clone(),
            "--state".to_string(),
            "all".to_string(),
            "--limit".to_string(),
            self.limit.to_string(),
            "--json".to_string(),
            "number,title,body,createdAt".to_string(),
        ];
        if let Some(repo) = &self.repo {
            args.push("--repo".to_string());
            args.push(repo.clone());
        }
        args
    }
}

#[async_trait]
impl IssueSource for GhCliSource {
    async fn fetch(&self) -> Result<Vec<serde_json::Value>> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new("gh")
                .args(self.args())
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .with_context(|| format!("gh issue list timed out after {:?}", self.timeout))?
        .context("Failed to run gh")?;

        if !output.status.success() {
            bail!(
                "gh issue list failed ({}): {}",
                output.status,
                crate::truncate_safe(String::from_utf8_lossy(&output.stderr).trim(), 300)
            );
        }

        serde_json::from_slice(&output.stdout).context("Failed to parse gh issue list output")
    }

    fn name(&self) -> &'static str {
        "gh"
    }
}

/// Build the configured source
pub fn from_config(config: &SourceConfig) -> Result<Box<dyn IssueSource>> {
    match config.kind {
        SourceKind::Gh => Ok(Box::new(GhCliSource::new(
            config.label.clone(),
            config.repo.clone(),
            config.limit,
            Duration::from_secs(config.timeout_secs),
        ))),
        SourceKind::File => {
            let path = config
                .snapshot_path
                .clone()
                .context("source.snapshot_path is required for the file source")?;
            Ok(Box::new(SnapshotFileSource::new(path)))
        }
    }
}
