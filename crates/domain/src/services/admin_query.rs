//! Read-only search and summary for administrators.

use chrono::Duration;
use std::sync::Arc;

use super::clock::Clock;
use super::store::RequestStore;
use crate::error::SarError;
use crate::models::{
    AdminRequestView, AdminSearchPage, AdminSearchQuery, AdminSummary, SearchCriteria,
};

/// Admin view over the request table. Never mutates a row.
#[derive(Clone)]
pub struct AdminQueryService {
    store: Arc<dyn RequestStore>,
    clock: Arc<dyn Clock>,
    overdue_threshold: Duration,
    lease_duration: Duration,
}

impl AdminQueryService {
    pub fn new(
        store: Arc<dyn RequestStore>,
        clock: Arc<dyn Clock>,
        overdue_threshold: Duration,
        lease_duration: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            overdue_threshold,
            lease_duration,
        }
    }

    pub async fn search(&self, query: &AdminSearchQuery) -> Result<AdminSearchPage, SarError> {
        let now = self.clock.now();
        let criteria = self.criteria(query, now);

        let counts = self.store.summary_counts(criteria.overdue_cutoff).await?;
        let (rows, filtered_count) = self.store.search(&criteria).await?;

        let total_pages = match criteria.page {
            Some(page) => shared::pagination::total_pages(filtered_count, page.size),
            None if filtered_count > 0 => 1,
            None => 0,
        };

        let requests = rows
            .iter()
            .map(|r| AdminRequestView::new(r, now, self.overdue_threshold, self.lease_duration))
            .collect();

        Ok(AdminSearchPage {
            counts,
            filtered_count,
            page: criteria.page,
            total_pages,
            requests,
        })
    }

    /// Counts only; pagination in the query is ignored.
    pub async fn summary(&self, query: &AdminSearchQuery) -> Result<AdminSummary, SarError> {
        let now = self.clock.now();
        let mut criteria = self.criteria(query, now);
        // A one-row page keeps the store from materialising every match.
        criteria.page = Some(shared::pagination::PageRequest { page: 1, size: 1 });

        let counts = self.store.summary_counts(criteria.overdue_cutoff).await?;
        let (_, filtered_count) = self.store.search(&criteria).await?;

        Ok(AdminSummary {
            counts,
            filtered_count,
        })
    }

    fn criteria(&self, query: &AdminSearchQuery, now: chrono::DateTime<chrono::Utc>) -> SearchCriteria {
        SearchCriteria {
            filter: query.filter(),
            search: query.search.clone(),
            overdue_cutoff: now - self.overdue_threshold,
            page: query.page(),
        }
    }
}
