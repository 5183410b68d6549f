//! Background job scheduler and the watchdog jobs.

mod backlog_alert;
mod overdue_alert;
mod pool_metrics;
mod retention_cleanup;
mod scheduler;
mod timeout_sweep;

pub use backlog_alert::BacklogAlertJob;
pub use overdue_alert::OverdueAlertJob;
pub use pool_metrics::PoolMetricsJob;
pub use retention_cleanup::RetentionCleanupJob;
pub use scheduler::{run_job, Job, JobFrequency, JobScheduler};
pub use timeout_sweep::TimeoutSweepJob;
