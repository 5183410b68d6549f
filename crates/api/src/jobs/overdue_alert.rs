//! Alerts on pending requests past the overdue threshold.

use chrono::Duration;
use domain::services::{AlertKind, AlertPayload, Clock, Notifier, RequestStore};
use std::sync::Arc;
use tracing::{info, warn};

use super::scheduler::{Job, JobFrequency};
use crate::middleware::metrics::record_overdue_requests;

/// Reports requests still pending after `threshold`. Never modifies a row.
pub struct OverdueAlertJob {
    store: Arc<dyn RequestStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    threshold: Duration,
    interval_minutes: u64,
}

impl OverdueAlertJob {
    pub fn new(
        store: Arc<dyn RequestStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        threshold: Duration,
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
impl Job for OverdueAlertJob {
    fn name(&self) -> &'static str {
        "overdue_alert"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(self.interval_minutes)
    }

    async fn execute(&self) -> Result<(), String> {
        let now = self.clock.now();
        let overdue = self
            .store
            .find_pending_requested_before(now - self.threshold)
            .await
            .map_err(|e| format!("Failed to find overdue requests: {}", e))?;

        record_overdue_requests(overdue.len());

        if overdue.is_empty() {
            info!("No overdue subject access requests");
            return Ok(());
        }

        let ids: Vec<_> = overdue.iter().map(|r| r.id).collect();
        warn!(
            count = ids.len(),
            threshold_minutes = self.threshold.num_minutes(),
            request_ids = ?ids,
            "Subject access requests are overdue"
        );

        self.notifier
            .notify(
                AlertKind::OverdueRequests,
                AlertPayload::new(
                    format!(
                        "{} subject access request(s) pending for more than {} hours",
                        ids.len(),
                        self.threshold.num_hours()
                    ),
                    ids.len() as i64,
                    now,
                )
                .with_request_ids(ids),
            )
            .await;

        Ok(())
    }
}
