//! Subject access request domain model.
//!
//! A subject access request (SAR) is one report job: compile everything the
//! named downstream services hold about a subject for a date range.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::SarError;

/// Lifecycle status of a subject access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Waiting for, or currently leased by, a report worker.
    Pending,
    /// The report was generated.
    Completed,
    /// Gave up on the request. Retry by duplicating it.
    Errored,
}

impl Status {
    /// Whether no further transition is possible from this status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::Pending)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Pending => write!(f, "pending"),
            Status::Completed => write!(f, "completed"),
            Status::Errored => write!(f, "errored"),
        }
    }
}

/// The person a request is about, identified in exactly one system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "system", content = "id", rename_all = "snake_case")]
pub enum Subject {
    /// Prison number.
    Nomis(String),
    /// Probation case reference number.
    Probation(String),
}

impl Subject {
    /// Build a subject from the two optional identifier fields used on the
    /// wire. Blank values count as absent. Exactly one must remain.
    pub fn from_identifiers(
        nomis_id: Option<&str>,
        ndelius_case_reference_id: Option<&str>,
    ) -> Result<Self, SarError> {
        let nomis_id = nomis_id.map(str::trim).filter(|s| !s.is_empty());
        let ndelius_id = ndelius_case_reference_id
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let subject = match (nomis_id, ndelius_id) {
            (Some(id), None) => Subject::Nomis(id.to_string()),
            (None, Some(id)) => Subject::Probation(id.to_string()),
            (Some(_), Some(_)) => {
                return Err(SarError::Validation(
                    "Both nomisId and ndeliusCaseReferenceId were provided; exactly one is required"
                        .to_string(),
                ))
            }
            (None, None) => {
                return Err(SarError::Validation(
                    "Neither nomisId nor ndeliusCaseReferenceId was provided; exactly one is required"
                        .to_string(),
                ))
            }
        };

        shared::validation::validate_subject_identifier(subject.identifier()).map_err(|e| {
            SarError::Validation(
                e.message
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string()),
            )
        })?;

        Ok(subject)
    }

    pub fn identifier(&self) -> &str {
        match self {
            Subject::Nomis(id) | Subject::Probation(id) => id,
        }
    }

    pub fn nomis_id(&self) -> Option<&str> {
        match self {
            Subject::Nomis(id) => Some(id),
            Subject::Probation(_) => None,
        }
    }

    pub fn ndelius_case_reference_id(&self) -> Option<&str> {
        match self {
            Subject::Probation(id) => Some(id),
            Subject::Nomis(_) => None,
        }
    }
}

/// A stored subject access request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectAccessRequest {
    pub id: Uuid,
    pub status: Status,
    pub date_from: Option<NaiveDate>,
    pub date_to: NaiveDate,
    pub sar_case_reference_number: String,
    /// Comma separated downstream service names.
    pub services: String,
    pub subject: Subject,
    pub requested_by: String,
    pub request_date_time: DateTime<Utc>,
    pub claim_attempts: i32,
    pub claim_date_time: Option<DateTime<Utc>>,
    pub object_url: Option<String>,
    pub last_downloaded: Option<DateTime<Utc>>,
}

/// The caller-supplied part of a new request, already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubjectAccessRequest {
    pub date_from: Option<NaiveDate>,
    pub date_to: NaiveDate,
    pub sar_case_reference_number: String,
    pub services: String,
    pub subject: Subject,
    pub requested_by: String,
}

impl SubjectAccessRequest {
    /// A fresh, unclaimed `Pending` row.
    pub fn pending(new: NewSubjectAccessRequest, request_date_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: Status::Pending,
            date_from: new.date_from,
            date_to: new.date_to,
            sar_case_reference_number: new.sar_case_reference_number,
            services: new.services,
            subject: new.subject,
            requested_by: new.requested_by,
            request_date_time,
            claim_attempts: 0,
            claim_date_time: None,
            object_url: None,
            last_downloaded: None,
        }
    }

    /// The fields a duplicate carries over, with a new requester.
    pub fn duplicate_fields(&self, requested_by: &str) -> NewSubjectAccessRequest {
        NewSubjectAccessRequest {
            date_from: self.date_from,
            date_to: self.date_to,
            sar_case_reference_number: self.sar_case_reference_number.clone(),
            services: self.services.clone(),
            subject: self.subject.clone(),
            requested_by: requested_by.to_string(),
        }
    }

    /// Still pending after the advisory threshold.
    pub fn is_overdue(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.status == Status::Pending && self.request_date_time < now - threshold
    }

    /// A worker currently holds an unexpired lease on this row.
    pub fn lease_active(&self, now: DateTime<Utc>, lease: Duration) -> bool {
        self.status == Status::Pending
            && self
                .claim_date_time
                .map(|claimed| claimed >= now - lease)
                .unwrap_or(false)
    }

    /// Whether a claim issued at `now` would be granted.
    pub fn is_claimable(&self, now: DateTime<Utc>, lease: Duration) -> bool {
        self.status == Status::Pending && !self.lease_active(now, lease)
    }
}

// ============================================================================
// Request DTOs
// ============================================================================

/// Request payload for creating a subject access request.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubjectAccessRequest {
    #[serde(default)]
    pub date_from: Option<NaiveDate>,

    /// Defaults to today when omitted.
    #[serde(default)]
    pub date_to: Option<NaiveDate>,

    #[validate(custom(function = "shared::validation::validate_not_blank"))]
    #[validate(length(max = 255, message = "Case reference too long"))]
    pub sar_case_reference_number: String,

    #[validate(custom(function = "shared::validation::validate_services"))]
    pub services: String,

    #[serde(default)]
    pub nomis_id: Option<String>,

    #[serde(default)]
    pub ndelius_case_reference_id: Option<String>,
}

impl CreateSubjectAccessRequest {
    /// Validate the payload and resolve defaults into a storable request.
    pub fn into_new_request(
        self,
        requested_by: &str,
        today: NaiveDate,
    ) -> Result<NewSubjectAccessRequest, SarError> {
        self.validate()?;

        let subject = Subject::from_identifiers(
            self.nomis_id.as_deref(),
            self.ndelius_case_reference_id.as_deref(),
        )?;

        let date_to = self.date_to.unwrap_or(today);
        shared::validation::validate_date_range(self.date_from, date_to).map_err(|e| {
            SarError::Validation(
                e.message
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string()),
            )
        })?;

        if requested_by.trim().is_empty() {
            return Err(SarError::Validation(
                "The requesting principal must be known".to_string(),
            ));
        }

        Ok(NewSubjectAccessRequest {
            date_from: self.date_from,
            date_to,
            sar_case_reference_number: self.sar_case_reference_number.trim().to_string(),
            services: shared::validation::normalize_services(&self.services),
            subject,
            requested_by: requested_by.trim().to_string(),
        })
    }
}

/// Request payload for completing a request.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSubjectAccessRequest {
    /// Where the worker stored the generated report, if it reports one.
    #[validate(length(min = 1, max = 2048, message = "objectUrl must be 1-2048 characters"))]
    #[serde(default)]
    pub object_url: Option<String>,
}

// ============================================================================
// Response DTOs
// ============================================================================

/// Wire representation of a subject access request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAccessRequestResponse {
    pub id: Uuid,
    pub status: Status,
    pub date_from: Option<NaiveDate>,
    pub date_to: NaiveDate,
    pub sar_case_reference_number: String,
    pub services: String,
    pub nomis_id: Option<String>,
    pub ndelius_case_reference_id: Option<String>,
    pub requested_by: String,
    pub request_date_time: DateTime<Utc>,
    pub claim_attempts: i32,
    pub claim_date_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_url: Option<String>,
    pub last_downloaded: Option<DateTime<Utc>>,
}

impl From<&SubjectAccessRequest> for SubjectAccessRequestResponse {
    fn from(request: &SubjectAccessRequest) -> Self {
        Self {
            id: request.id,
            status: request.status,
            date_from: request.date_from,
            date_to: request.date_to,
            sar_case_reference_number: request.sar_case_reference_number.clone(),
            services: request.services.clone(),
            nomis_id: request.subject.nomis_id().map(str::to_string),
            ndelius_case_reference_id: request
                .subject
                .ndelius_case_reference_id()
                .map(str::to_string),
            requested_by: request.requested_by.clone(),
            request_date_time: request.request_date_time,
            claim_attempts: request.claim_attempts,
            claim_date_time: request.claim_date_time,
            object_url: request.object_url.clone(),
            last_downloaded: request.last_downloaded,
        }
    }
}

/// Response to a successful create or duplicate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedResponse {
    pub id: Uuid,
}

/// Result of a claim attempt, as seen by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClaimOutcome {
    /// The caller now holds the lease. `attempt` is the new attempt count.
    Claimed { attempt: i32 },
    /// Someone else holds the lease, or the row is no longer pending.
    NotClaimed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(now: DateTime<Utc>) -> SubjectAccessRequest {
        SubjectAccessRequest::pending(
            NewSubjectAccessRequest {
                date_from: NaiveDate::from_ymd_opt(2023, 1, 1),
                date_to: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                sar_case_reference_number: "CASE-001".to_string(),
                services: "keyworker-api,offender-case-notes".to_string(),
                subject: Subject::Nomis("A1111AA".to_string()),
                requested_by: "ADMIN_USER".to_string(),
            },
            now,
        )
    }

    fn create_payload(nomis: Option<&str>, ndelius: Option<&str>) -> CreateSubjectAccessRequest {
        CreateSubjectAccessRequest {
            date_from: None,
            date_to: None,
            sar_case_reference_number: "CASE-001".to_string(),
            services: "keyworker-api".to_string(),
            nomis_id: nomis.map(str::to_string),
            ndelius_case_reference_id: ndelius.map(str::to_string),
        }
    }

    #[test]
    fn test_status_display_and_terminal() {
        assert_eq!(Status::Pending.to_string(), "pending");
        assert_eq!(Status::Completed.to_string(), "completed");
        assert_eq!(Status::Errored.to_string(), "errored");
        assert!(!Status::Pending.is_terminal());
        assert!(Status::Completed.is_terminal());
        assert!(Status::Errored.is_terminal());
    }

    #[test]
    fn test_subject_requires_exactly_one_identifier() {
        assert_eq!(
            Subject::from_identifiers(Some("A1111AA"), None).unwrap(),
            Subject::Nomis("A1111AA".to_string())
        );
        assert_eq!(
            Subject::from_identifiers(None, Some("X123456")).unwrap(),
            Subject::Probation("X123456".to_string())
        );
        assert!(matches!(
            Subject::from_identifiers(Some("A1111AA"), Some("X123456")),
            Err(SarError::Validation(_))
        ));
        assert!(matches!(
            Subject::from_identifiers(None, None),
            Err(SarError::Validation(_))
        ));
    }

    #[test]
    fn test_subject_blank_identifier_counts_as_absent() {
        assert_eq!(
            Subject::from_identifiers(Some("  "), Some("X123456")).unwrap(),
            Subject::Probation("X123456".to_string())
        );
        assert!(Subject::from_identifiers(Some(""), Some(" ")).is_err());
    }

    #[test]
    fn test_subject_accessors() {
        let subject = Subject::Probation("X123456".to_string());
        assert_eq!(subject.identifier(), "X123456");
        assert_eq!(subject.nomis_id(), None);
        assert_eq!(subject.ndelius_case_reference_id(), Some("X123456"));
    }

    #[test]
    fn test_pending_row_defaults() {
        let now = Utc::now();
        let row = sample(now);
        assert_eq!(row.status, Status::Pending);
        assert_eq!(row.claim_attempts, 0);
        assert!(row.claim_date_time.is_none());
        assert!(row.object_url.is_none());
        assert!(row.last_downloaded.is_none());
        assert_eq!(row.request_date_time, now);
    }

    #[test]
    fn test_lease_window() {
        let now = Utc::now();
        let lease = Duration::minutes(30);
        let mut row = sample(now);
        assert!(row.is_claimable(now, lease));

        row.claim_date_time = Some(now - Duration::minutes(10));
        assert!(row.lease_active(now, lease));
        assert!(!row.is_claimable(now, lease));

        row.claim_date_time = Some(now - Duration::minutes(31));
        assert!(!row.lease_active(now, lease));
        assert!(row.is_claimable(now, lease));

        row.status = Status::Completed;
        assert!(!row.is_claimable(now, lease));
    }

    #[test]
    fn test_overdue_only_applies_to_pending() {
        let now = Utc::now();
        let mut row = sample(now - Duration::hours(13));
        assert!(row.is_overdue(now, Duration::hours(12)));
        assert!(!row.is_overdue(now, Duration::hours(14)));

        row.status = Status::Errored;
        assert!(!row.is_overdue(now, Duration::hours(12)));
    }

    #[test]
    fn test_duplicate_fields_copy_request_data() {
        let row = sample(Utc::now());
        let copy = row.duplicate_fields("SECOND_ADMIN");
        assert_eq!(copy.date_from, row.date_from);
        assert_eq!(copy.date_to, row.date_to);
        assert_eq!(copy.sar_case_reference_number, row.sar_case_reference_number);
        assert_eq!(copy.services, row.services);
        assert_eq!(copy.subject, row.subject);
        assert_eq!(copy.requested_by, "SECOND_ADMIN");
    }

    #[test]
    fn test_create_payload_defaults_date_to_today() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let new = create_payload(Some("A1111AA"), None)
            .into_new_request("ADMIN_USER", today)
            .unwrap();
        assert_eq!(new.date_to, today);
        assert_eq!(new.subject, Subject::Nomis("A1111AA".to_string()));
    }

    #[test]
    fn test_create_payload_rejects_inverted_range() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let mut payload = create_payload(Some("A1111AA"), None);
        payload.date_from = NaiveDate::from_ymd_opt(2024, 6, 1);
        assert!(matches!(
            payload.into_new_request("ADMIN_USER", today),
            Err(SarError::Validation(_))
        ));
    }

    #[test]
    fn test_create_payload_rejects_blank_case_reference() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let mut payload = create_payload(Some("A1111AA"), None);
        payload.sar_case_reference_number = "  ".to_string();
        assert!(matches!(
            payload.into_new_request("ADMIN_USER", today),
            Err(SarError::Validation(_))
        ));
    }

    #[test]
    fn test_create_payload_normalizes_services() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let mut payload = create_payload(Some("A1111AA"), None);
        payload.services = " keyworker-api , offender-case-notes,keyworker-api".to_string();
        let new = payload.into_new_request("ADMIN_USER", today).unwrap();
        assert_eq!(new.services, "keyworker-api,offender-case-notes");
    }

    #[test]
    fn test_create_payload_deserializes_camel_case() {
        let payload: CreateSubjectAccessRequest = serde_json::from_str(
            r#"{
                "dateFrom": "2023-01-01",
                "sarCaseReferenceNumber": "CASE-9",
                "services": "keyworker-api",
                "ndeliusCaseReferenceId": "X123456"
            }"#,
        )
        .unwrap();
        assert_eq!(payload.date_from, NaiveDate::from_ymd_opt(2023, 1, 1));
        assert!(payload.date_to.is_none());
        assert!(payload.nomis_id.is_none());
        assert_eq!(payload.ndelius_case_reference_id.as_deref(), Some("X123456"));
    }

    #[test]
    fn test_response_flattens_subject() {
        let row = sample(Utc::now());
        let response = SubjectAccessRequestResponse::from(&row);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["nomisId"], "A1111AA");
        assert!(json["ndeliusCaseReferenceId"].is_null());
        assert_eq!(json["status"], "pending");
        assert_eq!(json["claimAttempts"], 0);
        assert!(json.get("objectUrl").is_none());
    }

    #[test]
    fn test_claim_outcome_serialization() {
        let claimed = serde_json::to_value(ClaimOutcome::Claimed { attempt: 2 }).unwrap();
        assert_eq!(claimed["outcome"], "claimed");
        assert_eq!(claimed["attempt"], 2);
        let not_claimed = serde_json::to_value(ClaimOutcome::NotClaimed).unwrap();
        assert_eq!(not_claimed["outcome"], "not_claimed");
    }
}
