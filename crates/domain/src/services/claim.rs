//! Lease-based claim coordination.
//!
//! Report workers poll for unclaimed requests, claim one, generate the report
//! and call complete. A claim is a lease: it lapses after the lease duration so
//! a crashed worker's request becomes claimable again without operator action.

use chrono::Duration;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::clock::Clock;
use super::document_store::DocumentStore;
use super::store::{RequestStore, StatusUpdate, StoreError};
use crate::error::SarError;
use crate::models::{ClaimOutcome, Status, SubjectAccessRequest};

/// Default lease length.
pub const DEFAULT_LEASE_MINUTES: i64 = 30;

/// Default wait for a row lock before reporting `Busy`.
pub const DEFAULT_LOCK_TIMEOUT_MILLIS: u64 = 3000;

/// Upper bound on rows returned by [`ClaimCoordinator::find_unclaimed`].
pub const DEFAULT_UNCLAIMED_LIMIT: u32 = 50;

/// Claim settings.
#[derive(Debug, Clone, Copy)]
pub struct ClaimSettings {
    pub lease_duration: Duration,
    pub lock_timeout: std::time::Duration,
    pub unclaimed_limit: u32,
}

impl Default for ClaimSettings {
    fn default() -> Self {
        Self {
            lease_duration: Duration::minutes(DEFAULT_LEASE_MINUTES),
            lock_timeout: std::time::Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MILLIS),
            unclaimed_limit: DEFAULT_UNCLAIMED_LIMIT,
        }
    }
}

/// Grants leases on pending requests and records their completion.
#[derive(Clone)]
pub struct ClaimCoordinator {
    store: Arc<dyn RequestStore>,
    documents: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    settings: ClaimSettings,
}

impl ClaimCoordinator {
    pub fn new(
        store: Arc<dyn RequestStore>,
        documents: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        settings: ClaimSettings,
    ) -> Self {
        Self {
            store,
            documents,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &ClaimSettings {
        &self.settings
    }

    /// Pending requests a claim would currently be granted on, oldest first.
    pub async fn find_unclaimed(&self) -> Result<Vec<SubjectAccessRequest>, SarError> {
        let now = self.clock.now();
        let rows = self
            .store
            .find_unclaimed(now - self.settings.lease_duration, self.settings.unclaimed_limit)
            .await?;
        debug!(count = rows.len(), "Found unclaimed subject access requests");
        Ok(rows)
    }

    /// Try to take the lease on a request.
    ///
    /// Losing a race, or finding the lease still held, is `NotClaimed` rather
    /// than an error so the caller can move on to another request.
    pub async fn claim(&self, id: Uuid) -> Result<ClaimOutcome, SarError> {
        let now = self.clock.now();
        let lease_cutoff = now - self.settings.lease_duration;

        match self
            .store
            .claim(id, now, lease_cutoff, self.settings.lock_timeout)
            .await
        {
            Ok(Some(attempt)) => {
                counter!("sar_claims_total", "outcome" => "claimed").increment(1);
                info!(request_id = %id, attempt = attempt, "Claimed subject access request");
                Ok(ClaimOutcome::Claimed { attempt })
            }
            Ok(None) => {
                if self.store.find_by_id(id).await?.is_none() {
                    return Err(SarError::NotFound(id));
                }
                counter!("sar_claims_total", "outcome" => "not_claimed").increment(1);
                debug!(request_id = %id, "Subject access request not claimable");
                Ok(ClaimOutcome::NotClaimed)
            }
            Err(StoreError::Busy(_)) => {
                counter!("sar_claims_total", "outcome" => "busy").increment(1);
                warn!(
                    request_id = %id,
                    lock_timeout_ms = self.settings.lock_timeout.as_millis() as u64,
                    "Timed out waiting for subject access request lock"
                );
                Err(SarError::Busy(id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Mark a pending request completed.
    ///
    /// A second completion reports `AlreadyCompleted` and changes nothing. An
    /// errored request stays errored: any partial report is discarded and the
    /// caller gets `IsErrored`.
    pub async fn complete(&self, id: Uuid, object_url: Option<String>) -> Result<(), SarError> {
        let update =
            StatusUpdate::new(Status::Pending, Status::Completed).with_object_url(object_url);

        if self
            .store
            .update_status(id, update, self.settings.lock_timeout)
            .await?
        {
            counter!("sar_completions_total", "outcome" => "completed").increment(1);
            info!(request_id = %id, "Completed subject access request");
            return Ok(());
        }

        let current = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(SarError::NotFound(id))?;

        match current.status {
            Status::Completed => {
                counter!("sar_completions_total", "outcome" => "already_completed").increment(1);
                warn!(request_id = %id, "Subject access request already completed");
                Err(SarError::AlreadyCompleted(id))
            }
            Status::Errored => {
                counter!("sar_completions_total", "outcome" => "errored").increment(1);
                warn!(
                    request_id = %id,
                    "Completion reported for errored subject access request"
                );
                self.discard_partial_report(id).await;
                Err(SarError::IsErrored(id))
            }
            // Guarded update missed but the row reads as pending: it changed
            // under us between the two statements.
            Status::Pending => Err(SarError::Busy(id)),
        }
    }

    async fn discard_partial_report(&self, id: Uuid) {
        match self.documents.delete(id).await {
            Ok(outcome) if outcome.is_gone() => {
                debug!(request_id = %id, outcome = ?outcome, "Discarded partial report");
            }
            Ok(outcome) => {
                warn!(request_id = %id, outcome = ?outcome, "Could not discard partial report");
            }
            Err(e) => {
                warn!(request_id = %id, error = %e, "Could not discard partial report");
            }
        }
    }
}
