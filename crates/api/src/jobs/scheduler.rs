//! Job scheduler infrastructure for background tasks.
//!
//! Each job runs on its own task with fixed-delay scheduling: the next run
//! starts one period after the previous run finished. The first run is
//! delayed by a random offset so replicas started together spread out.

use domain::services::{AlertKind, AlertPayload, Clock, Notifier};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::middleware::metrics::record_job_run;

/// Job frequency for scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobFrequency {
    /// Run every N seconds.
    Seconds(u64),
    /// Run every N minutes.
    Minutes(u64),
}

impl JobFrequency {
    /// Get the delay between job executions.
    pub fn duration(&self) -> Duration {
        match self {
            JobFrequency::Seconds(secs) => Duration::from_secs(*secs),
            JobFrequency::Minutes(mins) => Duration::from_secs(mins.saturating_mul(60)),
        }
    }
}

/// Trait for implementing background jobs.
#[async_trait::async_trait]
pub trait Job: Send + Sync {
    /// The name of this job (used for logging and metrics).
    fn name(&self) -> &'static str;

    /// The delay between the end of one run and the start of the next.
    fn frequency(&self) -> JobFrequency;

    /// Execute one run. Returns Err with a message on failure.
    async fn execute(&self) -> Result<(), String>;
}

/// Run a job once, isolating its failures.
///
/// The run executes on its own task, so a panic is caught as a failed run.
/// Failures are logged, counted and reported to the notifier. Returns whether
/// the run succeeded.
pub async fn run_job(job: Arc<dyn Job>, notifier: &dyn Notifier, clock: &dyn Clock) -> bool {
    let name = job.name();
    let start = Instant::now();

    let task = {
        let job = Arc::clone(&job);
        tokio::spawn(async move { job.execute().await })
    };

    let failure = match task.await {
        Ok(Ok(())) => None,
        Ok(Err(message)) => Some(message),
        Err(join_error) if join_error.is_panic() => Some("job panicked".to_string()),
        Err(join_error) => Some(join_error.to_string()),
    };

    let elapsed = start.elapsed();
    match failure {
        None => {
            record_job_run(name, "success", elapsed.as_secs_f64());
            info!(job = name, elapsed_ms = elapsed.as_millis() as u64, "Job completed");
            true
        }
        Some(message) => {
            record_job_run(name, "failure", elapsed.as_secs_f64());
            error!(
                job = name,
                elapsed_ms = elapsed.as_millis() as u64,
                error = %message,
                "Job failed"
            );
            notifier
                .notify(
                    AlertKind::JobFailed,
                    AlertPayload::new(format!("Job {} failed: {}", name, message), 1, clock.now()),
                )
                .await;
            false
        }
    }
}

/// Background job scheduler.
pub struct JobScheduler {
    jobs: Vec<Arc<dyn Job>>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    initial_jitter: Duration,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl JobScheduler {
    /// Create a new job scheduler.
    ///
    /// Each job's first run is delayed by a random offset in
    /// `[0, initial_jitter]`.
    pub fn new(notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>, initial_jitter: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            jobs: Vec::new(),
            notifier,
            clock,
            initial_jitter,
            shutdown_tx,
            shutdown_rx,
            handles: Vec::new(),
        }
    }

    /// Register a job with the scheduler.
    pub fn register<J: Job + 'static>(&mut self, job: J) {
        self.jobs.push(Arc::new(job));
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|j| j.name()).collect()
    }

    /// Start all registered jobs.
    pub fn start(&mut self) {
        info!("Starting job scheduler with {} jobs", self.jobs.len());

        let max_jitter_ms = self.initial_jitter.as_millis() as u64;

        for job in &self.jobs {
            let job = Arc::clone(job);
            let notifier = Arc::clone(&self.notifier);
            let clock = Arc::clone(&self.clock);
            let mut shutdown_rx = self.shutdown_rx.clone();
            let offset = Duration::from_millis(rand::thread_rng().gen_range(0..=max_jitter_ms));

            let handle = tokio::spawn(async move {
                let name = job.name();
                let period = job.frequency().duration();
                info!(
                    job = name,
                    period_secs = period.as_secs(),
                    initial_delay_ms = offset.as_millis() as u64,
                    "Job scheduled"
                );

                let mut delay = offset;
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown_rx.changed() => {
                            info!(job = name, "Job shutting down");
                            break;
                        }
                    }
                    if *shutdown_rx.borrow() {
                        info!(job = name, "Job shutting down");
                        break;
                    }

                    run_job(Arc::clone(&job), notifier.as_ref(), clock.as_ref()).await;
                    delay = period;
                }
            });

            self.handles.push(handle);
        }
    }

    /// Signal all jobs to stop after their current run.
    pub fn shutdown(&self) {
        info!("Initiating job scheduler shutdown");
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for all jobs to stop, giving up after `timeout`.
    pub async fn wait_for_shutdown(self, timeout: Duration) {
        info!("Waiting for jobs to complete (timeout: {:?})", timeout);

        let shutdown_future = async {
            for handle in self.handles {
                if let Err(e) = handle.await {
                    warn!("Job task panicked: {}", e);
                }
            }
        };

        match tokio::time::timeout(timeout, shutdown_future).await {
            Ok(()) => info!("All jobs completed gracefully"),
            Err(_) => warn!("Job shutdown timed out after {:?}", timeout),
        }
    }
}
