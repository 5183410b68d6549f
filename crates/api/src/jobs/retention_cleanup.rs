//! Removes old finished requests once their report is gone.

use chrono::Duration;
use domain::services::{Clock, DocumentStore, RequestStore};
use metrics::counter;
use std::sync::Arc;
use tracing::{info, warn};

use super::scheduler::{Job, JobFrequency};

/// Deletes completed and errored requests older than `retention_age`.
///
/// A row is removed only after the document store confirms its report is
/// absent. Anything else keeps the row for the next run.
pub struct RetentionCleanupJob {
    store: Arc<dyn RequestStore>,
    documents: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    retention_age: Duration,
    interval_minutes: u64,
}

impl RetentionCleanupJob {
    pub fn new(
        store: Arc<dyn RequestStore>,
        documents: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        retention_age: Duration,
        interval_minutes: u64,
    ) -> Self {
        Self {
            store,
            documents,
            clock,
            retention_age,
            interval_minutes,
        }
    }
}

#[async_trait::async_trait]
impl Job for RetentionCleanupJob {
    fn name(&self) -> &'static str {
        "retention_cleanup"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(self.interval_minutes)
    }

    async fn execute(&self) -> Result<(), String> {
        let cutoff = self.clock.now() - self.retention_age;
        let expired = self
            .store
            .find_finished_requested_before(cutoff)
            .await
            .map_err(|e| format!("Failed to find expired requests: {}", e))?;

        let mut deleted = 0u64;
        let mut kept = 0u64;

        for request in expired {
            let confirmed = match self.documents.delete(request.id).await {
                Ok(outcome) if outcome.is_gone() => true,
                Ok(outcome) => {
                    warn!(
                        request_id = %request.id,
                        outcome = ?outcome,
                        "Document store did not confirm report deletion, keeping request"
                    );
                    false
                }
                Err(e) => {
                    warn!(
                        request_id = %request.id,
                        error = %e,
                        "Document store unavailable, keeping request"
                    );
                    false
                }
            };
            if !confirmed {
                kept += 1;
                continue;
            }

            match self.store.delete_by_id(request.id).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(request_id = %request.id, error = %e, "Failed to delete request");
                    kept += 1;
                }
            }
        }

        counter!("sar_requests_deleted_total").increment(deleted);
        info!(deleted, kept, "Retention cleanup finished");
        Ok(())
    }
}
