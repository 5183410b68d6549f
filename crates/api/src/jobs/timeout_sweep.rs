//! Moves long-pending requests to the errored state.

use chrono::Duration;
use domain::models::Status;
use domain::services::{
    AlertKind, AlertPayload, Clock, Notifier, RequestStore, StatusUpdate, StoreError,
};
use metrics::counter;
use std::sync::Arc;
use tracing::{info, warn};

use super::scheduler::{Job, JobFrequency};

/// Errors every request still pending after `threshold`.
///
/// Each row is updated on its own. A busy row is left for the next run. A
/// row whose update fails does not stop the others, but fails the run once
/// every row has been tried.
pub struct TimeoutSweepJob {
    store: Arc<dyn RequestStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    threshold: Duration,
    lock_timeout: std::time::Duration,
    interval_minutes: u64,
}

impl TimeoutSweepJob {
    pub fn new(
        store: Arc<dyn RequestStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        threshold: Duration,
        lock_timeout: std::time::Duration,
        interval_minutes: u64,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            threshold,
            lock_timeout,
            interval_minutes,
        }
    }
}

#[async_trait::async_trait]
impl Job for TimeoutSweepJob {
    fn name(&self) -> &'static str {
        "timeout_sweep"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(self.interval_minutes)
    }

    async fn execute(&self) -> Result<(), String> {
        let now = self.clock.now();
        let candidates = self
            .store
            .find_pending_requested_before(now - self.threshold)
            .await
            .map_err(|e| format!("Failed to find timed out requests: {}", e))?;

        let mut errored = Vec::new();
        let mut failed = Vec::new();
        for request in candidates {
            let update = StatusUpdate::new(Status::Pending, Status::Errored);
            match self
                .store
                .update_status(request.id, update, self.lock_timeout)
                .await
            {
                Ok(true) => errored.push(request.id),
                // Completed or errored since it was read.
                Ok(false) => {}
                Err(StoreError::Busy(id)) => {
                    warn!(request_id = %id, "Request locked, timeout deferred to next run");
                }
                Err(e) => {
                    warn!(request_id = %request.id, error = %e, "Failed to time out request");
                    failed.push(request.id);
                }
            }
        }

        if errored.is_empty() {
            if failed.is_empty() {
                info!("No subject access requests timed out");
            }
            return failure(&failed);
        }

        counter!("sar_requests_timed_out_total").increment(errored.len() as u64);
        warn!(
            count = errored.len(),
            request_ids = ?errored,
            "Subject access requests timed out and moved to errored"
        );

        self.notifier
            .notify(
                AlertKind::TimedOutRequests,
                AlertPayload::new(
                    format!(
                        "{} subject access request(s) timed out after {} hours",
                        errored.len(),
                        self.threshold.num_hours()
                    ),
                    errored.len() as i64,
                    now,
                )
                .with_request_ids(errored),
            )
            .await;

        failure(&failed)
    }
}

fn failure(failed: &[uuid::Uuid]) -> Result<(), String> {
    if failed.is_empty() {
        return Ok(());
    }
    Err(format!(
        "Failed to time out {} request(s): {:?}",
        failed.len(),
        failed
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::run_job;
    use crate::jobs::test_support::{seed, FailingStatusUpdates};
    use chrono::{TimeZone, Utc};
    use domain::services::{FixedClock, InMemoryRequestStore, RecordingNotifier};

    struct Fixture {
        store: Arc<InMemoryRequestStore>,
        notifier: Arc<RecordingNotifier>,
        job: TimeoutSweepJob,
    }

    fn fixture(now: chrono::DateTime<Utc>) -> Fixture {
        let store = Arc::new(InMemoryRequestStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let job = TimeoutSweepJob::new(
            store.clone(),
            notifier.clone(),
            Arc::new(FixedClock::new(now)),
            Duration::hours(48),
            std::time::Duration::from_millis(50),
            30,
        );
        Fixture {
            store,
            notifier,
            job,
        }
    }

    #[tokio::test]
    async fn test_errors_only_rows_past_threshold() {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap();
        let f = fixture(now);
        let stale = seed(&f.store, Status::Pending, now - Duration::hours(49)).await;
        let recent = seed(&f.store, Status::Pending, now - Duration::hours(47)).await;
        let completed = seed(&f.store, Status::Completed, now - Duration::hours(60)).await;

        f.job.execute().await.unwrap();

        let status = |id| {
            let store = f.store.clone();
            async move { store.find_by_id(id).await.unwrap().unwrap().status }
        };
        assert_eq!(status(stale).await, Status::Errored);
        assert_eq!(status(recent).await, Status::Pending);
        assert_eq!(status(completed).await, Status::Completed);

        let alerts = f.notifier.alerts_of(AlertKind::TimedOutRequests);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].request_ids, vec![stale]);
    }

    #[tokio::test]
    async fn test_second_run_changes_nothing() {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap();
        let f = fixture(now);
        seed(&f.store, Status::Pending, now - Duration::hours(72)).await;

        f.job.execute().await.unwrap();
        f.job.execute().await.unwrap();

        assert_eq!(f.notifier.alerts_of(AlertKind::TimedOutRequests).len(), 1);
    }

    #[tokio::test]
    async fn test_locked_row_is_skipped() {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap();
        let f = fixture(now);
        let locked = seed(&f.store, Status::Pending, now - Duration::hours(72)).await;
        let free = seed(&f.store, Status::Pending, now - Duration::hours(72)).await;

        let guard = f.store.acquire_row_lock(locked).await.unwrap();
        f.job.execute().await.unwrap();
        drop(guard);

        assert_eq!(
            f.store.find_by_id(locked).await.unwrap().unwrap().status,
            Status::Pending
        );
        assert_eq!(
            f.store.find_by_id(free).await.unwrap().unwrap().status,
            Status::Errored
        );
    }

    #[tokio::test]
    async fn test_failed_row_fails_run_after_sweeping_others() {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap();
        let inner = Arc::new(InMemoryRequestStore::new());
        let broken = seed(&inner, Status::Pending, now - Duration::hours(72)).await;
        let healthy = seed(&inner, Status::Pending, now - Duration::hours(72)).await;

        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(FixedClock::new(now));
        let job = TimeoutSweepJob::new(
            Arc::new(FailingStatusUpdates::new(inner.clone(), broken)),
            notifier.clone(),
            clock.clone(),
            Duration::hours(48),
            std::time::Duration::from_millis(50),
            30,
        );

        let message = job.execute().await.unwrap_err();
        assert!(message.contains(&broken.to_string()));

        assert_eq!(
            inner.find_by_id(healthy).await.unwrap().unwrap().status,
            Status::Errored
        );
        assert_eq!(
            inner.find_by_id(broken).await.unwrap().unwrap().status,
            Status::Pending
        );
        let timed_out = notifier.alerts_of(AlertKind::TimedOutRequests);
        assert_eq!(timed_out.len(), 1);
        assert_eq!(timed_out[0].request_ids, vec![healthy]);
    }

    #[tokio::test]
    async fn test_only_failed_rows_still_raise_job_failure() {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap();
        let inner = Arc::new(InMemoryRequestStore::new());
        let broken = seed(&inner, Status::Pending, now - Duration::hours(72)).await;

        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(FixedClock::new(now));
        let job: Arc<dyn Job> = Arc::new(TimeoutSweepJob::new(
            Arc::new(FailingStatusUpdates::new(inner.clone(), broken)),
            notifier.clone(),
            clock.clone(),
            Duration::hours(48),
            std::time::Duration::from_millis(50),
            30,
        ));

        assert!(!run_job(job, notifier.as_ref(), clock.as_ref()).await);

        assert!(notifier.alerts_of(AlertKind::TimedOutRequests).is_empty());
        assert_eq!(notifier.alerts_of(AlertKind::JobFailed).len(), 1);
    }
}
