//! Admin search and summary models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use shared::pagination::PageRequest;

use super::subject_access_request::{Status, SubjectAccessRequest, SubjectAccessRequestResponse};

/// Which categories of request an admin search includes.
///
/// `pending` and `overdue` split the `Pending` status: a pending row is in
/// exactly one of the two, depending on its age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFilter {
    pub completed: bool,
    pub errored: bool,
    pub pending: bool,
    pub overdue: bool,
}

impl StatusFilter {
    pub fn all() -> Self {
        Self {
            completed: true,
            errored: true,
            pending: true,
            overdue: true,
        }
    }

    pub fn none() -> Self {
        Self {
            completed: false,
            errored: false,
            pending: false,
            overdue: false,
        }
    }

    /// Whether a row falls in one of the selected categories.
    pub fn matches(&self, request: &SubjectAccessRequest, overdue_cutoff: DateTime<Utc>) -> bool {
        match request.status {
            Status::Completed => self.completed,
            Status::Errored => self.errored,
            Status::Pending if request.request_date_time < overdue_cutoff => self.overdue,
            Status::Pending => self.pending,
        }
    }
}

impl Default for StatusFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Everything the store needs to run an admin search.
#[derive(Debug, Clone)]
pub struct SearchCriteria {
    pub filter: StatusFilter,
    /// Case-insensitive substring matched against the case reference and both
    /// subject identifier fields.
    pub search: Option<String>,
    /// Pending rows requested before this instant are overdue.
    pub overdue_cutoff: DateTime<Utc>,
    /// `None` returns every matching row.
    pub page: Option<PageRequest>,
}

impl SearchCriteria {
    /// The trimmed search term, if it has any content.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Whether a row matches the free-text search term.
    pub fn matches_search(&self, request: &SubjectAccessRequest) -> bool {
        let Some(term) = self.search_term() else {
            return true;
        };
        let term = term.to_lowercase();

        request
            .sar_case_reference_number
            .to_lowercase()
            .contains(&term)
            || request
                .subject
                .nomis_id()
                .map(|id| id.to_lowercase().contains(&term))
                .unwrap_or(false)
            || request
                .subject
                .ndelius_case_reference_id()
                .map(|id| id.to_lowercase().contains(&term))
                .unwrap_or(false)
    }

    /// Whether a row passes both the status filter and the search term.
    pub fn matches(&self, request: &SubjectAccessRequest) -> bool {
        self.filter.matches(request, self.overdue_cutoff) && self.matches_search(request)
    }
}

/// Per-category counts over the whole table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryCounts {
    pub total: i64,
    pub completed: i64,
    /// Every `Pending` row, overdue or not.
    pub pending: i64,
    /// The subset of `pending` past the overdue threshold.
    pub overdue: i64,
    pub errored: i64,
}

/// Query parameters accepted by the admin search and summary endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSearchQuery {
    #[serde(default = "default_true")]
    pub completed: bool,
    #[serde(default = "default_true")]
    pub errored: bool,
    #[serde(default = "default_true")]
    pub pending: bool,
    #[serde(default = "default_true")]
    pub overdue: bool,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl Default for AdminSearchQuery {
    fn default() -> Self {
        Self {
            completed: true,
            errored: true,
            pending: true,
            overdue: true,
            search: None,
            page_number: None,
            page_size: None,
        }
    }
}

impl AdminSearchQuery {
    pub fn filter(&self) -> StatusFilter {
        StatusFilter {
            completed: self.completed,
            errored: self.errored,
            pending: self.pending,
            overdue: self.overdue,
        }
    }

    pub fn page(&self) -> Option<PageRequest> {
        PageRequest::from_params(self.page_number, self.page_size)
    }
}

fn default_true() -> bool {
    true
}

/// A request row as shown to administrators, with computed fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRequestView {
    #[serde(flatten)]
    pub request: SubjectAccessRequestResponse,
    pub is_overdue: bool,
    pub lease_active: bool,
}

impl AdminRequestView {
    pub fn new(
        request: &SubjectAccessRequest,
        now: DateTime<Utc>,
        overdue_threshold: Duration,
        lease_duration: Duration,
    ) -> Self {
        Self {
            request: SubjectAccessRequestResponse::from(request),
            is_overdue: request.is_overdue(now, overdue_threshold),
            lease_active: request.lease_active(now, lease_duration),
        }
    }
}

/// One page of an admin search.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSearchPage {
    pub counts: SummaryCounts,
    /// Rows matching the filters and search term, across all pages.
    pub filtered_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<PageRequest>,
    pub total_pages: u32,
    pub requests: Vec<AdminRequestView>,
}

/// Summary without the rows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSummary {
    pub counts: SummaryCounts,
    pub filtered_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::subject_access_request::{NewSubjectAccessRequest, Subject};
    use chrono::NaiveDate;

    fn row(case_ref: &str, subject: Subject, requested: DateTime<Utc>) -> SubjectAccessRequest {
        SubjectAccessRequest::pending(
            NewSubjectAccessRequest {
                date_from: None,
                date_to: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                sar_case_reference_number: case_ref.to_string(),
                services: "keyworker-api".to_string(),
                subject,
                requested_by: "ADMIN".to_string(),
            },
            requested,
        )
    }

    fn criteria(search: Option<&str>, now: DateTime<Utc>) -> SearchCriteria {
        SearchCriteria {
            filter: StatusFilter::all(),
            search: search.map(str::to_string),
            overdue_cutoff: now - Duration::hours(12),
            page: None,
        }
    }

    #[test]
    fn test_filter_splits_pending_by_age() {
        let now = Utc::now();
        let cutoff = now - Duration::hours(12);
        let fresh = row("C1", Subject::Nomis("A1111AA".into()), now);
        let old = row("C2", Subject::Nomis("A1111AA".into()), now - Duration::hours(13));

        let only_overdue = StatusFilter {
            overdue: true,
            ..StatusFilter::none()
        };
        assert!(!only_overdue.matches(&fresh, cutoff));
        assert!(only_overdue.matches(&old, cutoff));

        let only_pending = StatusFilter {
            pending: true,
            ..StatusFilter::none()
        };
        assert!(only_pending.matches(&fresh, cutoff));
        assert!(!only_pending.matches(&old, cutoff));
    }

    #[test]
    fn test_filter_terminal_statuses() {
        let now = Utc::now();
        let mut completed = row("C1", Subject::Nomis("A1111AA".into()), now);
        completed.status = Status::Completed;
        let mut errored = row("C2", Subject::Nomis("A1111AA".into()), now);
        errored.status = Status::Errored;

        let filter = StatusFilter {
            completed: true,
            ..StatusFilter::none()
        };
        assert!(filter.matches(&completed, now));
        assert!(!filter.matches(&errored, now));
        assert!(!StatusFilter::none().matches(&completed, now));
    }

    #[test]
    fn test_search_is_case_insensitive_across_fields() {
        let now = Utc::now();
        let nomis = row("CASE-ABC", Subject::Nomis("A1111AA".into()), now);
        let probation = row("OTHER", Subject::Probation("X123456".into()), now);

        assert!(criteria(Some("case-abc"), now).matches(&nomis));
        assert!(criteria(Some("a1111"), now).matches(&nomis));
        assert!(!criteria(Some("a1111"), now).matches(&probation));
        assert!(criteria(Some("x1234"), now).matches(&probation));
        assert!(!criteria(Some("nothing"), now).matches(&probation));
    }

    #[test]
    fn test_blank_search_matches_everything() {
        let now = Utc::now();
        let nomis = row("CASE-ABC", Subject::Nomis("A1111AA".into()), now);
        assert!(criteria(Some("   "), now).matches(&nomis));
        assert!(criteria(None, now).matches(&nomis));
        assert_eq!(criteria(Some("  x "), now).search_term(), Some("x"));
    }

    #[test]
    fn test_admin_query_defaults() {
        let query: AdminSearchQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.filter(), StatusFilter::all());
        assert!(query.page().is_none());

        let query: AdminSearchQuery =
            serde_json::from_str(r#"{"completed": false, "pageNumber": 2}"#).unwrap();
        assert!(!query.filter().completed);
        assert_eq!(query.page().unwrap().page, 2);
    }

    #[test]
    fn test_admin_view_flattens_request() {
        let now = Utc::now();
        let mut request = row("C1", Subject::Nomis("A1111AA".into()), now - Duration::hours(13));
        request.claim_date_time = Some(now - Duration::minutes(5));
        let view = AdminRequestView::new(&request, now, Duration::hours(12), Duration::minutes(30));
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["isOverdue"], true);
        assert_eq!(json["leaseActive"], true);
        assert_eq!(json["sarCaseReferenceNumber"], "C1");
    }
}
