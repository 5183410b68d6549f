//! PostgreSQL request store.
//!
//! Lifecycle transitions run in a short transaction that first bounds how
//! long PostgreSQL may wait for the row lock (`SET LOCAL lock_timeout`), then
//! takes the lock with `SELECT ... FOR UPDATE` and applies the guarded
//! update. A lock wait that exceeds the bound fails with SQLSTATE `55P03`,
//! which surfaces as [`StoreError::Busy`].

use chrono::{DateTime, Utc};
use domain::models::{SearchCriteria, StatusFilter, SubjectAccessRequest, SummaryCounts};
use domain::services::{RequestStore, StatusUpdate, StoreError};
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use uuid::Uuid;

use crate::entities::{SarStatusDb, SubjectAccessRequestEntity};
use crate::metrics::QueryTimer;

/// SQLSTATE raised when `lock_timeout` elapses.
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// Request store backed by the `subject_access_requests` table.
#[derive(Clone)]
pub struct PgRequestStore {
    pool: PgPool,
}

impl PgRequestStore {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Open a transaction whose lock waits give up after `lock_timeout`.
    async fn begin_bounded(
        &self,
        id: Uuid,
        lock_timeout: Duration,
    ) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        // SET does not accept bind parameters; the value is an integer.
        let millis = lock_timeout.as_millis().max(1);
        sqlx::query(&format!("SET LOCAL lock_timeout = '{}ms'", millis))
            .execute(&mut *tx)
            .await
            .map_err(|e| row_error(id, e))?;

        Ok(tx)
    }

    /// Take the row lock. Returns false when the row does not exist.
    async fn lock_row(
        tx: &mut Transaction<'static, Postgres>,
        id: Uuid,
    ) -> Result<bool, StoreError> {
        let locked = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM subject_access_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| row_error(id, e))?;

        Ok(locked.is_some())
    }

    async fn fetch_many(
        &self,
        query_name: &'static str,
        sql: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SubjectAccessRequest>, StoreError> {
        let timer = QueryTimer::new(query_name);
        let entities = sqlx::query_as::<_, SubjectAccessRequestEntity>(sql)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await;
        timer.record();

        into_domain(entities.map_err(db_error)?)
    }

    /// Matching rows for one search page plus the total match count.
    async fn search_entities(
        &self,
        criteria: &SearchCriteria,
    ) -> Result<(Vec<SubjectAccessRequestEntity>, i64), sqlx::Error> {
        // $1 is always the overdue cutoff; the search pattern follows when present.
        let mut conditions = vec![status_clause(&criteria.filter)];
        let mut param_count = 1;
        let pattern = criteria.search_term().map(like_pattern);

        if pattern.is_some() {
            param_count += 1;
            conditions.push(format!(
                "(LOWER(sar_case_reference_number) LIKE ${p} ESCAPE '\\' \
                 OR LOWER(COALESCE(nomis_id, '')) LIKE ${p} ESCAPE '\\' \
                 OR LOWER(COALESCE(ndelius_case_reference_id, '')) LIKE ${p} ESCAPE '\\')",
                p = param_count
            ));
        }

        let where_clause = conditions.join(" AND ");

        // Count query
        let count_sql = format!(
            "SELECT COUNT(*) FROM subject_access_requests WHERE {}",
            where_clause
        );
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql).bind(criteria.overdue_cutoff);
        if let Some(ref pattern) = pattern {
            count_query = count_query.bind(pattern);
        }
        let total = count_query.fetch_one(&self.pool).await?;

        // List query
        let mut list_sql = format!(
            "SELECT * FROM subject_access_requests WHERE {} \
             ORDER BY request_date_time DESC, id ASC",
            where_clause
        );
        if criteria.page.is_some() {
            list_sql.push_str(&format!(
                " LIMIT ${} OFFSET ${}",
                param_count + 1,
                param_count + 2
            ));
        }

        let mut list_query =
            sqlx::query_as::<_, SubjectAccessRequestEntity>(&list_sql).bind(criteria.overdue_cutoff);
        if let Some(ref pattern) = pattern {
            list_query = list_query.bind(pattern);
        }
        if let Some(page) = criteria.page {
            list_query = list_query
                .bind(page.limit() as i64)
                .bind(page.offset() as i64);
        }

        let entities = list_query.fetch_all(&self.pool).await?;
        Ok((entities, total))
    }
}

#[async_trait::async_trait]
impl RequestStore for PgRequestStore {
    async fn insert(&self, request: &SubjectAccessRequest) -> Result<(), StoreError> {
        let timer = QueryTimer::new("insert");
        let result = sqlx::query(
            r#"
            INSERT INTO subject_access_requests (
                id, status, date_from, date_to, sar_case_reference_number,
                services, nomis_id, ndelius_case_reference_id, requested_by,
                request_date_time, claim_attempts, claim_date_time, object_url,
                last_downloaded
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(request.id)
        .bind(SarStatusDb::from(request.status))
        .bind(request.date_from)
        .bind(request.date_to)
        .bind(&request.sar_case_reference_number)
        .bind(&request.services)
        .bind(request.subject.nomis_id())
        .bind(request.subject.ndelius_case_reference_id())
        .bind(&request.requested_by)
        .bind(request.request_date_time)
        .bind(request.claim_attempts)
        .bind(request.claim_date_time)
        .bind(&request.object_url)
        .bind(request.last_downloaded)
        .execute(&self.pool)
        .await;
        timer.record();

        result.map_err(db_error)?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<SubjectAccessRequest>, StoreError> {
        let timer = QueryTimer::new("find_by_id");
        let entity = sqlx::query_as::<_, SubjectAccessRequestEntity>(
            "SELECT * FROM subject_access_requests WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        entity
            .map_err(db_error)?
            .map(SubjectAccessRequest::try_from)
            .transpose()
    }

    async fn claim(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        lease_cutoff: DateTime<Utc>,
        lock_timeout: Duration,
    ) -> Result<Option<i32>, StoreError> {
        let timer = QueryTimer::new("claim");
        let mut tx = self.begin_bounded(id, lock_timeout).await?;

        if !Self::lock_row(&mut tx, id).await? {
            tx.commit().await.map_err(db_error)?;
            timer.record();
            return Ok(None);
        }

        let attempts = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE subject_access_requests
            SET claim_attempts = claim_attempts + 1,
                claim_date_time = $2
            WHERE id = $1
              AND status = 'pending'
              AND (claim_date_time IS NULL OR claim_date_time < $3)
            RETURNING claim_attempts
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(lease_cutoff)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| row_error(id, e))?;

        tx.commit().await.map_err(db_error)?;
        timer.record();

        Ok(attempts)
    }

    async fn update_status(
        &self,
        id: Uuid,
        update: StatusUpdate,
        lock_timeout: Duration,
    ) -> Result<bool, StoreError> {
        let timer = QueryTimer::new("update_status");
        let mut tx = self.begin_bounded(id, lock_timeout).await?;

        if !Self::lock_row(&mut tx, id).await? {
            tx.commit().await.map_err(db_error)?;
            timer.record();
            return Ok(false);
        }

        let result = sqlx::query(
            r#"
            UPDATE subject_access_requests
            SET status = $2,
                object_url = COALESCE($3, object_url)
            WHERE id = $1 AND status = $4
            "#,
        )
        .bind(id)
        .bind(SarStatusDb::from(update.to))
        .bind(&update.object_url)
        .bind(SarStatusDb::from(update.from))
        .execute(&mut *tx)
        .await
        .map_err(|e| row_error(id, e))?;

        tx.commit().await.map_err(db_error)?;
        timer.record();

        Ok(result.rows_affected() > 0)
    }

    async fn update_last_downloaded(
        &self,
        id: Uuid,
        downloaded_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let timer = QueryTimer::new("update_last_downloaded");
        let result = sqlx::query(
            "UPDATE subject_access_requests SET last_downloaded = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(downloaded_at)
        .execute(&self.pool)
        .await;
        timer.record();

        Ok(result.map_err(db_error)?.rows_affected() > 0)
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<bool, StoreError> {
        let timer = QueryTimer::new("delete_by_id");
        let result = sqlx::query("DELETE FROM subject_access_requests WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await;
        timer.record();

        Ok(result.map_err(db_error)?.rows_affected() > 0)
    }

    async fn find_unclaimed(
        &self,
        lease_cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<SubjectAccessRequest>, StoreError> {
        let timer = QueryTimer::new("find_unclaimed");
        let entities = sqlx::query_as::<_, SubjectAccessRequestEntity>(
            r#"
            SELECT * FROM subject_access_requests
            WHERE status = 'pending'
              AND (claim_date_time IS NULL OR claim_date_time < $1)
            ORDER BY request_date_time ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(lease_cutoff)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await;
        timer.record();

        into_domain(entities.map_err(db_error)?)
    }

    async fn find_pending_requested_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SubjectAccessRequest>, StoreError> {
        self.fetch_many(
            "find_pending_requested_before",
            r#"
            SELECT * FROM subject_access_requests
            WHERE status = 'pending' AND request_date_time < $1
            ORDER BY request_date_time ASC, id ASC
            "#,
            cutoff,
        )
        .await
    }

    async fn find_finished_requested_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SubjectAccessRequest>, StoreError> {
        self.fetch_many(
            "find_finished_requested_before",
            r#"
            SELECT * FROM subject_access_requests
            WHERE status IN ('completed', 'errored') AND request_date_time < $1
            ORDER BY request_date_time ASC, id ASC
            "#,
            cutoff,
        )
        .await
    }

    async fn count_pending(&self) -> Result<i64, StoreError> {
        let timer = QueryTimer::new("count_pending");
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM subject_access_requests WHERE status = 'pending'",
        )
        .fetch_one(&self.pool)
        .await;
        timer.record();

        count.map_err(db_error)
    }

    async fn search(
        &self,
        criteria: &SearchCriteria,
    ) -> Result<(Vec<SubjectAccessRequest>, i64), StoreError> {
        let timer = QueryTimer::new("search");
        let result = self.search_entities(criteria).await;
        timer.record();

        let (entities, total) = result.map_err(db_error)?;
        Ok((into_domain(entities)?, total))
    }

    async fn summary_counts(
        &self,
        overdue_cutoff: DateTime<Utc>,
    ) -> Result<SummaryCounts, StoreError> {
        let timer = QueryTimer::new("summary_counts");
        let row = sqlx::query_as::<_, (i64, i64, i64, i64, i64)>(
            r#"
            SELECT
                COUNT(*) as total,
                COUNT(*) FILTER (WHERE status = 'completed') as completed,
                COUNT(*) FILTER (WHERE status = 'pending') as pending,
                COUNT(*) FILTER (WHERE status = 'pending' AND request_date_time < $1) as overdue,
                COUNT(*) FILTER (WHERE status = 'errored') as errored
            FROM subject_access_requests
            "#,
        )
        .bind(overdue_cutoff)
        .fetch_one(&self.pool)
        .await;
        timer.record();

        let row = row.map_err(db_error)?;
        Ok(SummaryCounts {
            total: row.0,
            completed: row.1,
            pending: row.2,
            overdue: row.3,
            errored: row.4,
        })
    }
}

fn into_domain(
    entities: Vec<SubjectAccessRequestEntity>,
) -> Result<Vec<SubjectAccessRequest>, StoreError> {
    entities
        .into_iter()
        .map(SubjectAccessRequest::try_from)
        .collect()
}

fn db_error(err: sqlx::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

/// Like [`db_error`], but a lock timeout on `id` becomes `Busy`.
fn row_error(id: Uuid, err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(LOCK_NOT_AVAILABLE) => {
            tracing::debug!(request_id = %id, "Row lock not available");
            StoreError::Busy(id)
        }
        _ => db_error(err),
    }
}

/// SQL predicate selecting the filtered categories. `$1` is the overdue cutoff.
fn status_clause(filter: &StatusFilter) -> String {
    let mut parts = Vec::new();
    if filter.completed {
        parts.push("status = 'completed'");
    }
    if filter.errored {
        parts.push("status = 'errored'");
    }
    match (filter.pending, filter.overdue) {
        (true, true) => parts.push("status = 'pending'"),
        (true, false) => parts.push("(status = 'pending' AND request_date_time >= $1)"),
        (false, true) => parts.push("(status = 'pending' AND request_date_time < $1)"),
        (false, false) => {}
    }

    // Every branch references $1 so the bind list has the same shape.
    if parts.is_empty() {
        return "($1::timestamptz IS NULL AND FALSE)".to_string();
    }
    if *filter == StatusFilter::all() {
        return "($1::timestamptz IS NOT NULL)".to_string();
    }
    format!("($1::timestamptz IS NOT NULL AND ({}))", parts.join(" OR "))
}

/// Lowercased `LIKE` pattern matching `term` anywhere, with wildcards escaped.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
