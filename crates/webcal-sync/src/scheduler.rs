//! Periodic refresh driver.
//!
//! Wraps a [`RefreshService`] in a background loop: refresh the
//! configured principals on an interval with jitter, back off on
//! consecutive failures, and accept commands (manual refresh, pause,
//! resume, stop) over a channel.
//!
//! One scheduler per store is assumed; coordinating multiple schedulers
//! against a shared store is the embedder's responsibility.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error, info, warn};

use crate::refresh::{RefreshOptions, RefreshService};
use crate::report::RefreshReport;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Base interval between refresh runs.
    pub interval: Duration,
    /// Maximum jitter as a fraction of the interval (0.0-1.0).
    pub jitter_fraction: f64,
    /// Initial backoff after a failed run.
    pub initial_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
    /// Backoff multiplier per consecutive failure.
    pub backoff_multiplier: f64,
    /// Consecutive failures before periodic runs are suspended. A
    /// forced manual refresh still runs and clears the streak on
    /// success.
    pub max_consecutive_failures: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            jitter_fraction: 0.1,
            initial_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(1800),
            backoff_multiplier: 2.0,
            max_consecutive_failures: 10,
        }
    }
}

impl SchedulerConfig {
    /// Creates a config with the given base interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Builder: set the jitter fraction.
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Builder: set backoff parameters.
    pub fn with_backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self.backoff_multiplier = multiplier;
        self
    }

    /// The next run delay with jitter applied.
    pub fn next_delay(&self) -> Duration {
        let base = self.interval.as_secs_f64();
        let range = base * self.jitter_fraction;
        let jitter = if range > 0.0 {
            rand::rng().random_range(-range..=range)
        } else {
            0.0
        };
        Duration::from_secs_f64((base + jitter).max(0.0))
    }

    /// Exponential backoff for the given failure streak, capped.
    pub fn backoff_delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_backoff.as_secs_f64();
        let multiplier = self.backoff_multiplier.powi(consecutive_failures as i32 - 1);
        let max = self.max_backoff.as_secs_f64();

        Duration::from_secs_f64((base * multiplier).min(max))
    }
}

/// Commands accepted by a running scheduler.
#[derive(Debug, Clone)]
pub enum SchedulerCommand {
    /// Run a refresh immediately.
    RefreshNow {
        /// Bypass the per-subscription due-ness check.
        force: bool,
    },
    /// Pause periodic runs.
    Pause,
    /// Resume periodic runs.
    Resume,
    /// Stop the scheduler.
    Stop,
}

/// Counts carried over from the last completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    /// Subscriptions refreshed.
    pub refreshed: usize,
    /// Subscriptions skipped as not due.
    pub skipped: usize,
    /// Subscriptions that failed.
    pub failed: usize,
}

impl ReportSummary {
    fn add(&mut self, report: &RefreshReport) {
        self.refreshed += report.refreshed();
        self.skipped += report.skipped();
        self.failed += report.failed();
    }
}

/// Observable scheduler state.
#[derive(Debug, Clone, Default)]
pub struct SchedulerState {
    /// Whether periodic runs are paused.
    pub paused: bool,
    /// Failed runs in a row.
    pub consecutive_failures: u32,
    /// When the last run finished.
    pub last_run: Option<DateTime<Utc>>,
    /// The last run's error, if it failed.
    pub last_error: Option<String>,
    /// The last successful run's counts.
    pub last_summary: Option<ReportSummary>,
}

impl SchedulerState {
    fn record_success(&mut self, summary: ReportSummary) {
        self.consecutive_failures = 0;
        self.last_run = Some(Utc::now());
        self.last_error = None;
        self.last_summary = Some(summary);
    }

    fn record_failure(&mut self, error: impl Into<String>) {
        self.consecutive_failures += 1;
        self.last_run = Some(Utc::now());
        self.last_error = Some(error.into());
    }
}

/// Shared scheduler state.
pub type SharedSchedulerState = Arc<RwLock<SchedulerState>>;

/// Periodically refreshes the subscriptions of a set of principals.
pub struct RefreshScheduler {
    config: SchedulerConfig,
    principals: Vec<String>,
    service: Arc<RefreshService>,
    state: SharedSchedulerState,
    command_tx: mpsc::Sender<SchedulerCommand>,
    command_rx: Option<mpsc::Receiver<SchedulerCommand>>,
}

impl RefreshScheduler {
    /// Creates a scheduler for the given principals.
    pub fn new(
        config: SchedulerConfig,
        principals: Vec<String>,
        service: Arc<RefreshService>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        Self {
            config,
            principals,
            service,
            state: Arc::new(RwLock::new(SchedulerState::default())),
            command_tx,
            command_rx: Some(command_rx),
        }
    }

    /// Returns a handle for sending commands.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            command_tx: self.command_tx.clone(),
            state: self.state.clone(),
        }
    }

    /// Returns the shared state.
    pub fn state(&self) -> SharedSchedulerState {
        self.state.clone()
    }

    /// Runs the scheduler loop until stopped.
    pub async fn run(mut self) {
        let mut command_rx = self.command_rx.take().expect("run called twice");

        info!(
            interval_secs = self.config.interval.as_secs(),
            principals = self.principals.len(),
            "Refresh scheduler started"
        );

        // Initial run on startup.
        self.do_run(RefreshOptions::default()).await;

        loop {
            let delay = self.next_run_delay().await;
            debug!(delay_secs = delay.as_secs(), "Scheduling next refresh run");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if self.state.read().await.paused {
                        debug!("Scheduler paused, skipping run");
                        continue;
                    }
                    self.do_run(RefreshOptions::default()).await;
                }
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::RefreshNow { force }) => {
                            debug!(force, "Received RefreshNow command");
                            self.do_run(RefreshOptions { force }).await;
                        }
                        Some(SchedulerCommand::Pause) => {
                            info!("Scheduler paused");
                            self.state.write().await.paused = true;
                        }
                        Some(SchedulerCommand::Resume) => {
                            info!("Scheduler resumed");
                            self.state.write().await.paused = false;
                        }
                        Some(SchedulerCommand::Stop) | None => {
                            info!("Scheduler stopping");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn next_run_delay(&self) -> Duration {
        let failures = self.state.read().await.consecutive_failures;
        if failures > 0 {
            let backoff = self.config.backoff_delay(failures);
            debug!(
                failures,
                backoff_secs = backoff.as_secs(),
                "Using backoff delay"
            );
            return backoff;
        }
        self.config.next_delay()
    }

    async fn do_run(&self, options: RefreshOptions) {
        let failures = self.state.read().await.consecutive_failures;
        if failures >= self.config.max_consecutive_failures && !options.force {
            error!(
                failures,
                max = self.config.max_consecutive_failures,
                "Max consecutive failures reached, suspending periodic runs"
            );
            return;
        }

        let mut summary = ReportSummary::default();
        for principal in &self.principals {
            match self.service.refresh_principal(principal, options).await {
                Ok(report) => summary.add(&report),
                Err(e) => {
                    warn!(principal = %principal, error = %e, "Refresh run failed");
                    self.state.write().await.record_failure(e.to_string());
                    return;
                }
            }
        }

        info!(
            refreshed = summary.refreshed,
            skipped = summary.skipped,
            failed = summary.failed,
            "Refresh run finished"
        );
        self.state.write().await.record_success(summary);
    }
}

/// Handle for controlling a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    state: SharedSchedulerState,
}

impl SchedulerHandle {
    /// Triggers an immediate refresh run.
    pub async fn refresh_now(
        &self,
        force: bool,
    ) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx
            .send(SchedulerCommand::RefreshNow { force })
            .await
    }

    /// Pauses periodic runs.
    pub async fn pause(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::Pause).await
    }

    /// Resumes periodic runs.
    pub async fn resume(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::Resume).await
    }

    /// Stops the scheduler.
    pub async fn stop(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::Stop).await
    }

    /// Returns a snapshot of the scheduler state.
    pub async fn state(&self) -> SchedulerState {
        self.state.read().await.clone()
    }

    /// Returns true if the scheduler is paused.
    pub async fn is_paused(&self) -> bool {
        self.state.read().await.paused
    }
}
