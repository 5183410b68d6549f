//! Subject access request entity.

use chrono::{DateTime, NaiveDate, Utc};
use domain::models::{Status, Subject, SubjectAccessRequest};
use domain::services::StoreError;
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for request status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "sar_status", rename_all = "snake_case")]
pub enum SarStatusDb {
    Pending,
    Completed,
    Errored,
}

impl From<Status> for SarStatusDb {
    fn from(status: Status) -> Self {
        match status {
            Status::Pending => Self::Pending,
            Status::Completed => Self::Completed,
            Status::Errored => Self::Errored,
        }
    }
}

impl From<SarStatusDb> for Status {
    fn from(status: SarStatusDb) -> Self {
        match status {
            SarStatusDb::Pending => Status::Pending,
            SarStatusDb::Completed => Status::Completed,
            SarStatusDb::Errored => Status::Errored,
        }
    }
}

/// Row of `subject_access_requests`.
#[derive(Debug, Clone, FromRow)]
pub struct SubjectAccessRequestEntity {
    pub id: Uuid,
    pub status: SarStatusDb,
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
    pub object_url: Option<String>,
    pub last_downloaded: Option<DateTime<Utc>>,
}

impl TryFrom<SubjectAccessRequestEntity> for SubjectAccessRequest {
    type Error = StoreError;

    fn try_from(entity: SubjectAccessRequestEntity) -> Result<Self, Self::Error> {
        let subject = match (entity.nomis_id, entity.ndelius_case_reference_id) {
            (Some(nomis), None) => Subject::Nomis(nomis),
            (None, Some(ndelius)) => Subject::Probation(ndelius),
            (Some(_), Some(_)) => {
                return Err(StoreError::Corrupt {
                    id: entity.id,
                    reason: "both subject identifiers are set".to_string(),
                })
            }
            (None, None) => {
                return Err(StoreError::Corrupt {
                    id: entity.id,
                    reason: "no subject identifier is set".to_string(),
                })
            }
        };

        Ok(SubjectAccessRequest {
            id: entity.id,
            status: entity.status.into(),
            date_from: entity.date_from,
            date_to: entity.date_to,
            sar_case_reference_number: entity.sar_case_reference_number,
            services: entity.services,
            subject,
            requested_by: entity.requested_by,
            request_date_time: entity.request_date_time,
            claim_attempts: entity.claim_attempts,
            claim_date_time: entity.claim_date_time,
            object_url: entity.object_url,
            last_downloaded: entity.last_downloaded,
        })
    }
}
