//! Supervised background loops
//!
//! Each named loop runs as its own task: run the job, sleep the interval,
//! repeat. A job that returns an error or panics marks the loop `Crashed`
//! and it is retried after an exponential backoff. Every iteration runs in
//! a separately spawned task, so a panic never leaves its loop, let alone
//! reaches a sibling. Shutdown cancels sleeps and in-flight jobs right away.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Type alias for a loop job; resolves to a short outcome summary
pub type LoopJob =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<String>> + Send>> + Send + Sync>;

/// Lifecycle of a supervised loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Running,
    Completed,
    Crashed,
    Stopped,
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopState::Idle => write!(f, "idle"),
            LoopState::Running => write!(f, "running"),
            LoopState::Completed => write!(f, "completed"),
            LoopState::Crashed => write!(f, "crashed"),
            LoopState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Scheduling policy for one loop
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Sleep after a successful run
    pub interval: Duration,
    /// Sleep after the first consecutive failure
    pub base_backoff: Duration,
    /// Upper bound on the failure sleep
    pub max_backoff: Duration,
}

impl LoopConfig {
    /// Interval-only policy; backoff starts at 5s and never exceeds the interval
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            base_backoff: Duration::from_secs(5).min(interval),
            max_backoff: interval,
        }
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max.max(base);
        self
    }

    /// Backoff after `consecutive_failures` failures in a row (1 = first)
    pub fn backoff_duration(&self, consecutive_failures: u32) -> Duration {
        let exp = consecutive_failures.saturating_sub(1).min(31);
        self.base_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }
}

/// Observable state of a loop
#[derive(Debug, Clone, Serialize)]
pub struct LoopStatus {
    pub name: String,
    pub state: LoopState,
    /// Completed runs
    pub runs: u64,
    /// Crashed runs
    pub failures: u64,
    pub consecutive_failures: u32,
    pub last_outcome: Option<String>,
    pub last_error: Option<String>,
    pub last_run: Option<DateTime<Utc>>,
}

impl LoopStatus {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: LoopState::Idle,
            runs: 0,
            failures: 0,
            consecutive_failures: 0,
            last_outcome: None,
            last_error: None,
            last_run: None,
        }
    }
}

type StatusMap = Arc<Mutex<HashMap<String, LoopStatus>>>;

/// Runs named loops and restarts them after crashes
pub struct LoopSupervisor {
    token: CancellationToken,
    statuses: StatusMap,
    handles: Vec<(String, JoinHandle<()>)>,
}

impl Default for LoopSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopSupervisor {
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Use an externally owned shutdown token
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            statuses: Arc::new(Mutex::new(HashMap::new())),
            handles: Vec::new(),
        }
    }

    /// Handle for triggering shutdown from elsewhere (e.g. a signal handler)
    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Start a named loop running `job` under `config`
    pub async fn spawn_loop<F, Fut>(&mut self, name: impl Into<String>, config: LoopConfig, job: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        let name = name.into();
        {
            let mut statuses = self.statuses.lock().await;
            if statuses.contains_key(&name) {
                bail!("Loop already registered: {}", name);
            }
            statuses.insert(name.clone(), LoopStatus::new(&name));
        }

        let job: LoopJob = Arc::new(move || Box::pin(job()));
        let handle = tokio::spawn(run_supervised(
            name.clone(),
            config,
            job,
            self.token.clone(),
            self.statuses.clone(),
        ));
        self.handles.push((name.clone(), handle));

        info!(loop_name = %name, "Supervised loop started");
        Ok(())
    }

    /// Snapshot of every loop's status, sorted by name
    pub async fn status(&self) -> Vec<LoopStatus> {
        let mut all: Vec<LoopStatus> = self.statuses.lock().await.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Status of one loop
    pub async fn loop_status(&self, name: &str) -> Option<LoopStatus> {
        self.statuses.lock().await.get(name).cloned()
    }

    /// Wait until every loop has exited (i.e. until the token is cancelled)
    pub async fn wait(self) {
        let (names, handles): (Vec<_>, Vec<_>) = self.handles.into_iter().unzip();
        let results = futures::future::join_all(handles).await;
        for (name, result) in names.into_iter().zip(results) {
            if let Err(e) = result {
                error!(loop_name = %name, error = %e, "Supervised loop task ended abnormally");
            }
        }
    }

    /// Cancel all loops and wait for them to stop
    pub async fn shutdown(self) {
        info!(loops = self.handles.len(), "Shutting down supervised loops");
        self.token.cancel();
        self.wait().await;
    }
}

async fn update(statuses: &StatusMap, name: &str, f: impl FnOnce(&mut LoopStatus)) {
    if let Some(status) = statuses.lock().await.get_mut(name) {
        f(status);
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

async fn run_supervised(
    name: String,
    config: LoopConfig,
    job: LoopJob,
    token: CancellationToken,
    statuses: StatusMap,
) {
    while !token.is_cancelled() {
        update(&statuses, &name, |s| {
            s.state = LoopState::Running;
            s.last_run = Some(Utc::now());
        })
        .await;

        let mut handle = tokio::spawn(job());
        let joined = tokio::select! {
            res = &mut handle => res,
            _ = token.cancelled() => {
                // Aborting drops the job future, which kills any child it owns
                handle.abort();
                let _ = handle.await;
                debug!(loop_name = %name, "In-flight run cancelled by shutdown");
                break;
            }
        };

        let failure = match joined {
            Ok(Ok(outcome)) => {
                debug!(loop_name = %name, outcome = %outcome, "Loop run completed");
                update(&statuses, &name, |s| {
                    s.state = LoopState::Completed;
                    s.runs += 1;
                    s.consecutive_failures = 0;
                    s.last_outcome = Some(outcome);
                })
                .await;
                None
            }
            Ok(Err(e)) => Some(format!("{:#}", e)),
            Err(e) if e.is_panic() => Some(format!("panicked: {}", panic_message(e.into_panic()))),
            Err(e) => Some(format!("task failed: {}", e)),
        };

        let delay = match failure {
            None => config.interval,
            Some(err) => {
                let mut consecutive = 0;
                update(&statuses, &name, |s| {
                    s.state = LoopState::Crashed;
                    s.failures += 1;
                    s.consecutive_failures += 1;
                    s.last_error = Some(err.clone());
                    consecutive = s.consecutive_failures;
                })
                .await;
                let backoff = config.backoff_duration(consecutive.max(1));
                warn!(
                    loop_name = %name,
                    error = %err,
                    consecutive_failures = consecutive,
                    backoff_ms = backoff.as_millis() as u64,
                    "Loop run crashed, restarting after backoff"
                );
                backoff
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = token.cancelled() => break,
        }
    }

    update(&statuses, &name, |s| s.state = LoopState::Stopped).await;
    info!(loop_name = %name, "Supervised loop stopped");
}
