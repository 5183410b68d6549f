//! In-process [`RequestStore`] implementation.
//!
//! Each row has its own async writer lock. Guarded updates wait for that lock
//! at most `lock_timeout`, which gives the same row-scoped exclusion as
//! `SELECT ... FOR UPDATE` with a lock timeout in PostgreSQL. Readers see the
//! last written version and never wait on a writer.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::store::{RequestStore, StatusUpdate, StoreError};
use crate::models::{SearchCriteria, Status, SubjectAccessRequest, SummaryCounts};

struct RowCell {
    lock: Arc<Mutex<()>>,
    data: StdRwLock<SubjectAccessRequest>,
}

impl RowCell {
    fn new(request: SubjectAccessRequest) -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            data: StdRwLock::new(request),
        }
    }

    fn read(&self) -> SubjectAccessRequest {
        self.data.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn write<R>(&self, f: impl FnOnce(&mut SubjectAccessRequest) -> R) -> R {
        f(&mut self.data.write().unwrap_or_else(|e| e.into_inner()))
    }
}

type Row = Arc<RowCell>;

/// Subject access requests held in memory.
#[derive(Default)]
pub struct InMemoryRequestStore {
    rows: RwLock<HashMap<Uuid, Row>>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the row's writer lock as a concurrent caller would, and hold it
    /// until the guard is dropped.
    pub async fn acquire_row_lock(&self, id: Uuid) -> Option<OwnedMutexGuard<()>> {
        let row = self.row(id).await?;
        Some(Arc::clone(&row.lock).lock_owned().await)
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    async fn row(&self, id: Uuid) -> Option<Row> {
        self.rows.read().await.get(&id).cloned()
    }

    /// The row and its held writer lock, or `None` if the row does not exist.
    async fn lock_row(
        &self,
        id: Uuid,
        lock_timeout: Duration,
    ) -> Result<Option<(Row, OwnedMutexGuard<()>)>, StoreError> {
        let Some(row) = self.row(id).await else {
            return Ok(None);
        };

        match tokio::time::timeout(lock_timeout, Arc::clone(&row.lock).lock_owned()).await {
            Ok(guard) => Ok(Some((row, guard))),
            Err(_) => Err(StoreError::Busy(id)),
        }
    }

    async fn snapshot(&self) -> Vec<SubjectAccessRequest> {
        self.rows
            .read()
            .await
            .values()
            .map(|row| row.read())
            .collect()
    }

    async fn select<F>(&self, predicate: F) -> Vec<SubjectAccessRequest>
    where
        F: Fn(&SubjectAccessRequest) -> bool,
    {
        let mut selected: Vec<_> = self
            .snapshot()
            .await
            .into_iter()
            .filter(|r| predicate(r))
            .collect();
        selected.sort_by(|a, b| {
            a.request_date_time
                .cmp(&b.request_date_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        selected
    }
}

#[async_trait::async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn insert(&self, request: &SubjectAccessRequest) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&request.id) {
            return Err(StoreError::Database(format!(
                "duplicate key: subject access request {} already exists",
                request.id
            )));
        }
        rows.insert(request.id, Arc::new(RowCell::new(request.clone())));
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<SubjectAccessRequest>, StoreError> {
        Ok(self.row(id).await.map(|row| row.read()))
    }

    async fn claim(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        lease_cutoff: DateTime<Utc>,
        lock_timeout: Duration,
    ) -> Result<Option<i32>, StoreError> {
        let Some((row, _guard)) = self.lock_row(id, lock_timeout).await? else {
            return Ok(None);
        };

        Ok(row.write(|r| {
            let lease_expired = r
                .claim_date_time
                .map(|claimed| claimed < lease_cutoff)
                .unwrap_or(true);

            if r.status != Status::Pending || !lease_expired {
                return None;
            }

            r.claim_attempts += 1;
            r.claim_date_time = Some(now);
            Some(r.claim_attempts)
        }))
    }

    async fn update_status(
        &self,
        id: Uuid,
        update: StatusUpdate,
        lock_timeout: Duration,
    ) -> Result<bool, StoreError> {
        let Some((row, _guard)) = self.lock_row(id, lock_timeout).await? else {
            return Ok(false);
        };

        Ok(row.write(|r| {
            if r.status != update.from {
                return false;
            }
            r.status = update.to;
            if update.object_url.is_some() {
                r.object_url = update.object_url;
            }
            true
        }))
    }

    async fn update_last_downloaded(
        &self,
        id: Uuid,
        downloaded_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        match self.row(id).await {
            Some(row) => {
                row.write(|r| r.last_downloaded = Some(downloaded_at));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.rows.write().await.remove(&id).is_some())
    }

    async fn find_unclaimed(
        &self,
        lease_cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<SubjectAccessRequest>, StoreError> {
        let mut rows = self
            .select(|r| {
                r.status == Status::Pending
                    && r.claim_date_time.map(|c| c < lease_cutoff).unwrap_or(true)
            })
            .await;
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn find_pending_requested_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SubjectAccessRequest>, StoreError> {
        Ok(self
            .select(|r| r.status == Status::Pending && r.request_date_time < cutoff)
            .await)
    }

    async fn find_finished_requested_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SubjectAccessRequest>, StoreError> {
        Ok(self
            .select(|r| r.status.is_terminal() && r.request_date_time < cutoff)
            .await)
    }

    async fn count_pending(&self) -> Result<i64, StoreError> {
        Ok(self
            .snapshot()
            .await
            .iter()
            .filter(|r| r.status == Status::Pending)
            .count() as i64)
    }

    async fn search(
        &self,
        criteria: &SearchCriteria,
    ) -> Result<(Vec<SubjectAccessRequest>, i64), StoreError> {
        let mut matching: Vec<_> = self
            .snapshot()
            .await
            .into_iter()
            .filter(|r| criteria.matches(r))
            .collect();
        matching.sort_by(|a, b| {
            b.request_date_time
                .cmp(&a.request_date_time)
                .then_with(|| a.id.cmp(&b.id))
        });

        let filtered_count = matching.len() as i64;
        let page = match criteria.page {
            Some(page) => matching
                .into_iter()
                .skip(page.offset() as usize)
                .take(page.limit() as usize)
                .collect(),
            None => matching,
        };

        Ok((page, filtered_count))
    }

    async fn summary_counts(
        &self,
        overdue_cutoff: DateTime<Utc>,
    ) -> Result<SummaryCounts, StoreError> {
        let mut counts = SummaryCounts::default();
        for row in self.snapshot().await {
            counts.total += 1;
            match row.status {
                Status::Completed => counts.completed += 1,
                Status::Errored => counts.errored += 1,
                Status::Pending => {
                    counts.pending += 1;
                    if row.request_date_time < overdue_cutoff {
                        counts.overdue += 1;
                    }
                }
            }
        }
        Ok(counts)
    }
}
