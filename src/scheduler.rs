// Background Refresh Scheduler
//
// Runs the model refresh once eagerly at startup, then on a fixed interval,
// each run bounded by a timeout. Keeps a short history of runs and publishes
// the outcome of every run to the event stream.

use crate::engine::{RecommendationEngine, RefreshReport};
use crate::events::{Event, EventBroadcaster};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, RwLock};
use tokio::time::{sleep, timeout};

const HISTORY_LIMIT: usize = 32;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("Job execution failed: {0}")]
    ExecutionError(String),
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Job error: {0}")]
    JobError(#[from] JobError),
}

/// A rebuild the scheduler can run
#[async_trait]
pub trait RefreshJob: Send + Sync {
    /// Job name (for logging and tracking)
    fn name(&self) -> &str;

    async fn run(&self) -> Result<RefreshReport, JobError>;
}

/// Full model refresh of a recommendation engine
pub struct ModelRefreshJob {
    engine: Arc<RecommendationEngine>,
}

impl ModelRefreshJob {
    pub fn new(engine: Arc<RecommendationEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl RefreshJob for ModelRefreshJob {
    fn name(&self) -> &str {
        "model_refresh"
    }

    async fn run(&self) -> Result<RefreshReport, JobError> {
        self.engine
            .refresh()
            .await
            .map_err(|e| JobError::ExecutionError(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Failed,
    Timeout,
}

/// Job execution record for tracking history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub id: String,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub status: JobStatus,
    pub report: Option<RefreshReport>,
    pub error_message: Option<String>,
}

pub struct RefreshScheduler {
    job: Arc<dyn RefreshJob>,
    events: EventBroadcaster,
    interval: Duration,
    max_duration: Duration,
    running: AtomicBool,
    wake: Notify,
    history: RwLock<VecDeque<JobRun>>,
}

impl RefreshScheduler {
    pub fn new(
        job: Arc<dyn RefreshJob>,
        events: EventBroadcaster,
        interval: Duration,
        max_duration: Duration,
    ) -> Self {
        Self {
            job,
            events,
            interval,
            max_duration,
            running: AtomicBool::new(false),
            wake: Notify::new(),
            history: RwLock::new(VecDeque::new()),
        }
    }

    /// Start the scheduler (runs until stopped)
    ///
    /// The first refresh runs immediately; later ones follow every
    /// `interval` after the previous run finished.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        tracing::info!(
            "Starting refresh scheduler (every {:?}, timeout {:?})",
            self.interval,
            self.max_duration
        );

        loop {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            self.run_job().await;

            tokio::select! {
                _ = sleep(self.interval) => {}
                _ = self.wake.notified() => {}
            }
        }

        tracing::info!("Stopping refresh scheduler");
        Ok(())
    }

    /// Stop the scheduler; an in-flight refresh finishes first
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run the job once with timeout and record the outcome
    pub async fn run_job(&self) -> JobRun {
        let job_name = self.job.name().to_string();
        let started_at = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();

        tracing::debug!("Starting job {} (id: {})", job_name, id);

        let result = match timeout(self.max_duration, self.job.run()).await {
            Ok(result) => result,
            Err(_) => Err(JobError::Timeout(self.max_duration)),
        };

        let (status, report, error_message) = match result {
            Ok(report) => {
                tracing::info!(
                    "Job {} completed: generation {} with {} resources",
                    job_name,
                    report.generation,
                    report.vocabulary_size
                );
                self.events.broadcast(Event::model_refreshed(
                    report.generation,
                    report.vocabulary_size,
                    report.embedding_source,
                ));
                (JobStatus::Success, Some(report), None)
            }
            Err(e) => {
                tracing::error!("Job {} failed: {}", job_name, e);
                self.events.broadcast(Event::refresh_failed(e.to_string()));
                let status = match e {
                    JobError::Timeout(_) => JobStatus::Timeout,
                    JobError::ExecutionError(_) => JobStatus::Failed,
                };
                (status, None, Some(e.to_string()))
            }
        };

        let run = JobRun {
            id,
            job_name,
            started_at,
            completed_at: Utc::now(),
            status,
            report,
            error_message,
        };

        let mut history = self.history.write().await;
        if history.len() == HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(run.clone());
        run
    }

    pub async fn last_run(&self) -> Option<JobRun> {
        self.history.read().await.back().cloned()
    }

    /// Most recent runs first
    pub async fn history(&self, limit: usize) -> Vec<JobRun> {
        self.history
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }
}
