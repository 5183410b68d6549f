//! Storage port for subject access requests.
//!
//! Every mutation is a single-row update guarded by a condition on the row's
//! current state, so callers never need cross-row transactions. Updates that
//! implement lifecycle transitions additionally take the row lock with a
//! bounded wait; failing to get it in time is [`StoreError::Busy`].

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{SearchCriteria, Status, SubjectAccessRequest, SummaryCounts};

/// Errors raised by a [`RequestStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The row lock was not acquired within the lock timeout.
    #[error("lock on subject access request {0} not acquired in time")]
    Busy(Uuid),

    #[error("database error: {0}")]
    Database(String),

    /// A stored row violates a model invariant.
    #[error("stored subject access request {id} is invalid: {reason}")]
    Corrupt { id: Uuid, reason: String },
}

/// A guarded status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// The update applies only while the row has this status.
    pub from: Status,
    pub to: Status,
    /// Recorded alongside the transition when present.
    pub object_url: Option<String>,
}

impl StatusUpdate {
    pub fn new(from: Status, to: Status) -> Self {
        Self {
            from,
            to,
            object_url: None,
        }
    }

    pub fn with_object_url(mut self, object_url: Option<String>) -> Self {
        self.object_url = object_url;
        self
    }
}

/// Durable table of subject access requests.
#[async_trait::async_trait]
pub trait RequestStore: Send + Sync {
    async fn insert(&self, request: &SubjectAccessRequest) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<SubjectAccessRequest>, StoreError>;

    /// Take a lease on a pending row.
    ///
    /// Applies only while the row is `Pending` and its `claim_date_time` is
    /// null or earlier than `lease_cutoff`. On success `claim_attempts` is
    /// incremented, `claim_date_time` set to `now`, and the new attempt count
    /// returned. `Ok(None)` means no row was affected.
    async fn claim(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        lease_cutoff: DateTime<Utc>,
        lock_timeout: Duration,
    ) -> Result<Option<i32>, StoreError>;

    /// Apply a guarded status transition. Returns whether a row was affected.
    async fn update_status(
        &self,
        id: Uuid,
        update: StatusUpdate,
        lock_timeout: Duration,
    ) -> Result<bool, StoreError>;

    async fn update_last_downloaded(
        &self,
        id: Uuid,
        downloaded_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn delete_by_id(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Pending rows a claim issued now would be granted, oldest first.
    async fn find_unclaimed(
        &self,
        lease_cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<SubjectAccessRequest>, StoreError>;

    /// Pending rows requested before `cutoff`, oldest first.
    async fn find_pending_requested_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SubjectAccessRequest>, StoreError>;

    /// Completed or errored rows requested before `cutoff`, oldest first.
    async fn find_finished_requested_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SubjectAccessRequest>, StoreError>;

    async fn count_pending(&self) -> Result<i64, StoreError>;

    /// Matching rows (newest first, paged per the criteria) and the number of
    /// matching rows across all pages.
    async fn search(
        &self,
        criteria: &SearchCriteria,
    ) -> Result<(Vec<SubjectAccessRequest>, i64), StoreError>;

    async fn summary_counts(
        &self,
        overdue_cutoff: DateTime<Utc>,
    ) -> Result<SummaryCounts, StoreError>;
}
