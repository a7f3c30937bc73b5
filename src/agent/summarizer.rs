//! Model-backed summarization seam
//!
//! The compactor only needs "text + budget in, shorter text out". Two real
//! backends are provided: an external CLI process and an OpenRouter HTTP call.
//! Every failure is reported as a [`SummarizeError`] so the caller can fall
//! back without caring which backend produced it.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::{SummarizerBackend, SummarizerConfig};

/// Why a summarization attempt produced nothing usable
#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("summarizer executable not found: {0}")]
    NotFound(String),
    #[error("summarizer timed out after {0:?}")]
    Timeout(Duration),
    #[error("summarizer exited with status {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },
    #[error("summarizer returned empty output")]
    Empty,
    #[error("summarizer request failed: {0}")]
    Http(String),
    #[error("summarizer I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Condenses learnings into plain-text bullets within a character budget
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `text` into at most roughly `budget` characters
    async fn summarize(&self, text: &str, budget: usize) -> Result<String, SummarizeError>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

/// Instruction sent along with the learnings
pub fn summary_prompt(text: &str, budget: usize) -> String {
    format!(
        "Condense the following operational learnings into plain-text bullet points.\n\
         - One bullet per distinct lesson, each starting with '- '.\n\
         - Merge lessons that say the same thing; prefer the most recent wording.\n\
         - Keep concrete commands, paths and version numbers.\n\
         - The whole answer MUST be at most {} characters.\n\
         - Output ONLY the bullets, no preamble.\n\n\
         Learnings:\n{}",
        budget, text
    )
}

/// Runs an external executable, feeding the prompt on stdin and reading bullets from stdout.
///
/// `{budget}` and `{model}` in the argument list are substituted per call.
pub struct CommandSummarizer {
    program: String,
    args: Vec<String>,
    model: String,
    timeout: Duration,
}

impl CommandSummarizer {
    pub fn new(program: impl Into<String>, args: Vec<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            model: model.into(),
            timeout,
        }
    }

    fn render_args(&self, budget: usize) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.replace("{budget}", &budget.to_string()).replace("{model}", &self.model))
            .collect()
    }
}

#[async_trait]
impl Summarizer for CommandSummarizer {
    async fn summarize(&self, text: &str, budget: usize) -> Result<String, SummarizeError> {
        let prompt = summary_prompt(text, budget).into_bytes();

        let mut cmd = Command::new(&self.program);
        cmd.args(self.render_args(budget))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SummarizeError::NotFound(self.program.clone()),
            _ => SummarizeError::Io(e),
        })?;

        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                match stdin.write_all(&prompt).await {
                    Ok(()) => {}
                    // The process may exit without reading its input
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        };

        // Dropping `child` on timeout kills the process (kill_on_drop)
        let (fed, output) = tokio::time::timeout(self.timeout, async move {
            tokio::join!(feed, child.wait_with_output())
        })
        .await
        .map_err(|_| SummarizeError::Timeout(self.timeout))?;
        fed?;
        let output = output?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SummarizeError::Exit {
                code: output.status.code(),
                stderr: crate::truncate_safe(stderr.trim(), 300),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() {
            return Err(SummarizeError::Empty);
        }
        debug!(program = %self.program, chars = stdout.chars().count(), "Summarizer produced output");
        Ok(stdout)
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

/// Summarizes through an OpenRouter-compatible chat completions endpoint
pub struct OpenRouterSummarizer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenRouterSummarizer {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
        })
    }
}

#[async_trait]
impl Summarizer for OpenRouterSummarizer {
    async fn summarize(&self, text: &str, budget: usize) -> Result<String, SummarizeError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "You are a concise summarizer. Output only bullet points."},
                {"role": "user", "content": summary_prompt(text, budget)},
            ],
            // ~4 chars per token, with some headroom
            "max_tokens": (budget / 3).max(64),
        });

        let response = self.client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SummarizeError::Timeout(self.timeout)
                } else {
                    SummarizeError::Http(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizeError::Http(format!("{}: {}", status, crate::truncate_safe(&body, 300))));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SummarizeError::Http(e.to_string()))?;

        let content = raw
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|msg| msg.get("content"))
            .and_then(|c| c.as_str())
            .unwrap_or("")
            .trim()
            .to_string();

        if content.is_empty() {
            return Err(SummarizeError::Empty);
        }
        Ok(content)
    }

    fn name(&self) -> &'static str {
        "openrouter"
    }
}

/// Build the configured summarizer, or `None` when summarization is disabled
pub fn from_config(config: &SummarizerConfig) -> anyhow::Result<Option<Arc<dyn Summarizer>>> {
    let timeout = Duration::from_secs(config.timeout_secs);
    match config.backend {
        SummarizerBackend::Disabled => Ok(None),
        SummarizerBackend::Command => Ok(Some(Arc::new(CommandSummarizer::new(
            config.command.clone(),
            config.args.clone(),
            config.model.clone(),
            timeout,
        )))),
        SummarizerBackend::OpenRouter => {
            let api_key = std::env::var("OPENROUTER_API_KEY")
                .map_err(|_| anyhow::anyhow!("OPENROUTER_API_KEY is not set"))?;
            Ok(Some(Arc::new(OpenRouterSummarizer::new(
                config.base_url.clone(),
                api_key,
                config.model.clone(),
                timeout,
            )?)))
        }
    }
}
