//! Alerts when the pending backlog grows past its threshold.

use domain::services::{AlertKind, AlertPayload, Clock, Notifier, RequestStore};
use std::sync::Arc;
use tracing::{info, warn};

use super::scheduler::{Job, JobFrequency};
use crate::middleware::metrics::record_pending_backlog;

/// Raises an alert on every run while more than `threshold` requests are
/// pending.
pub struct BacklogAlertJob {
    store: Arc<dyn RequestStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    threshold: i64,
    interval_minutes: u64,
}

impl BacklogAlertJob {
    pub fn new(
        store: Arc<dyn RequestStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        threshold: i64,
        interval_minutes: u64,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            threshold,
            interval_minutes,
        }
    }
}

#[async_trait::async_trait]
impl Job for BacklogAlertJob {
    fn name(&self) -> &'static str {
        "backlog_alert"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(self.interval_minutes)
    }

    async fn execute(&self) -> Result<(), String> {
        let pending = self
            .store
            .count_pending()
            .await
            .map_err(|e| format!("Failed to count pending requests: {}", e))?;

        record_pending_backlog(pending);

        if pending <= self.threshold {
            info!(pending, threshold = self.threshold, "Backlog within threshold");
            return Ok(());
        }

        warn!(pending, threshold = self.threshold, "Pending backlog exceeds threshold");
        self.notifier
            .notify(
                AlertKind::BacklogThresholdExceeded,
                AlertPayload::new(
                    format!(
                        "{} subject access requests pending, threshold is {}",
                        pending, self.threshold
                    ),
                    pending,
                    self.clock.now(),
                ),
            )
            .await;

        Ok(())
    }
}
