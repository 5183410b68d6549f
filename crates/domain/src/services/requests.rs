//! Request intake, retrieval, duplication and report download.

use metrics::counter;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::clock::Clock;
use super::document_store::DocumentStore;
use super::store::RequestStore;
use crate::error::SarError;
use crate::models::{CreateSubjectAccessRequest, SubjectAccessRequest};

/// Creates and reads subject access requests.
#[derive(Clone)]
pub struct RequestService {
    store: Arc<dyn RequestStore>,
    documents: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl RequestService {
    pub fn new(
        store: Arc<dyn RequestStore>,
        documents: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            documents,
            clock,
        }
    }

    /// Validate and store a new pending request. Invalid input creates no row.
    pub async fn create(
        &self,
        payload: CreateSubjectAccessRequest,
        requested_by: &str,
    ) -> Result<SubjectAccessRequest, SarError> {
        let new = payload.into_new_request(requested_by, self.clock.today())?;
        let request = SubjectAccessRequest::pending(new, self.clock.now());
        self.store.insert(&request).await?;

        counter!("sar_requests_created_total").increment(1);
        info!(
            request_id = %request.id,
            case_reference = %request.sar_case_reference_number,
            requested_by = %request.requested_by,
            "Created subject access request"
        );

        Ok(request)
    }

    pub async fn get(&self, id: Uuid) -> Result<SubjectAccessRequest, SarError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(SarError::NotFound(id))
    }

    /// Create a fresh pending copy of an existing request.
    ///
    /// This is the only retry path for an errored request.
    pub async fn duplicate(
        &self,
        id: Uuid,
        requested_by: &str,
    ) -> Result<SubjectAccessRequest, SarError> {
        if requested_by.trim().is_empty() {
            return Err(SarError::Validation(
                "The requesting principal must be known".to_string(),
            ));
        }

        let original = self.get(id).await?;
        let copy = SubjectAccessRequest::pending(
            original.duplicate_fields(requested_by.trim()),
            self.clock.now(),
        );
        self.store.insert(&copy).await?;

        counter!("sar_requests_duplicated_total").increment(1);
        info!(
            original_id = %original.id,
            request_id = %copy.id,
            original_status = %original.status,
            requested_by = %copy.requested_by,
            "Duplicated subject access request"
        );

        Ok(copy)
    }

    /// Fetch the generated report and record the download.
    pub async fn download(&self, id: Uuid) -> Result<Vec<u8>, SarError> {
        let request = self.get(id).await?;

        let contents = self
            .documents
            .retrieve(request.id)
            .await?
            .ok_or(SarError::NotFound(id))?;

        self.store
            .update_last_downloaded(request.id, self.clock.now())
            .await?;
        info!(request_id = %id, bytes = contents.len(), "Report downloaded");

        Ok(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Status, Subject};
    use crate::services::clock::FixedClock;
    use crate::services::document_store::InMemoryDocumentStore;
    use crate::services::in_memory_store::InMemoryRequestStore;
    use crate::services::store::StatusUpdate;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use fake::faker::name::en::Name;
    use fake::Fake;

    struct Fixture {
        store: Arc<InMemoryRequestStore>,
        documents: Arc<InMemoryDocumentStore>,
        clock: Arc<FixedClock>,
        service: RequestService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryRequestStore::new());
        let documents = Arc::new(InMemoryDocumentStore::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        ));
        let service = RequestService::new(store.clone(), documents.clone(), clock.clone());
        Fixture {
            store,
            documents,
            clock,
            service,
        }
    }

    fn payload(nomis: Option<&str>, ndelius: Option<&str>) -> CreateSubjectAccessRequest {
        CreateSubjectAccessRequest {
            date_from: NaiveDate::from_ymd_opt(2023, 1, 1),
            date_to: None,
            sar_case_reference_number: "CASE-1".to_string(),
            services: "keyworker-api,offender-case-notes".to_string(),
            nomis_id: nomis.map(str::to_string),
            ndelius_case_reference_id: ndelius.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_create_with_nomis_id() {
        let f = fixture();
        let requester: String = Name().fake();

        let created = f
            .service
            .create(payload(Some("A1111AA"), None), &requester)
            .await
            .unwrap();

        let stored = f.store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(stored.status, Status::Pending);
        assert_eq!(stored.claim_attempts, 0);
        assert_eq!(stored.subject, Subject::Nomis("A1111AA".to_string()));
        assert_eq!(stored.date_to, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(stored.request_date_time, f.clock.now());
        assert_eq!(stored.requested_by, requester.trim());
    }

    #[tokio::test]
    async fn test_create_with_both_ids_is_rejected() {
        let f = fixture();
        let result = f
            .service
            .create(payload(Some("A1111AA"), Some("X123456")), "ADMIN")
            .await;
        assert!(matches!(result, Err(SarError::Validation(_))));
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_create_with_neither_id_is_rejected() {
        let f = fixture();
        let result = f.service.create(payload(None, None), "ADMIN").await;
        assert!(matches!(result, Err(SarError::Validation(_))));
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_create_without_principal_is_rejected() {
        let f = fixture();
        let result = f.service.create(payload(Some("A1111AA"), None), " ").await;
        assert!(matches!(result, Err(SarError::Validation(_))));
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_copies_request_fields_only() {
        let f = fixture();
        let original = f
            .service
            .create(payload(None, Some("X123456")), "FIRST_ADMIN")
            .await
            .unwrap();
        f.store
            .claim(
                original.id,
                f.clock.now(),
                f.clock.now(),
                std::time::Duration::from_millis(100),
            )
            .await
            .unwrap();
        f.store
            .update_status(
                original.id,
                StatusUpdate::new(Status::Pending, Status::Errored),
                std::time::Duration::from_millis(100),
            )
            .await
            .unwrap();

        f.clock.advance(Duration::hours(50));
        let copy = f.service.duplicate(original.id, "SECOND_ADMIN").await.unwrap();

        assert_ne!(copy.id, original.id);
        assert_eq!(copy.status, Status::Pending);
        assert_eq!(copy.claim_attempts, 0);
        assert_eq!(copy.claim_date_time, None);
        assert_eq!(copy.requested_by, "SECOND_ADMIN");
        assert_eq!(copy.request_date_time, f.clock.now());
        assert_eq!(copy.date_from, original.date_from);
        assert_eq!(copy.date_to, original.date_to);
        assert_eq!(copy.sar_case_reference_number, original.sar_case_reference_number);
        assert_eq!(copy.services, original.services);
        assert_eq!(copy.subject, original.subject);

        let untouched = f.store.find_by_id(original.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, Status::Errored);
        assert_eq!(f.store.len().await, 2);
    }

    #[tokio::test]
    async fn test_duplicate_unknown_request() {
        let f = fixture();
        let result = f.service.duplicate(Uuid::new_v4(), "ADMIN").await;
        assert!(matches!(result, Err(SarError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_download_records_timestamp() {
        let f = fixture();
        let created = f
            .service
            .create(payload(Some("A1111AA"), None), "ADMIN")
            .await
            .unwrap();
        f.documents.put(created.id, b"%PDF-1.7".to_vec());
        f.clock.advance(Duration::hours(2));

        let bytes = f.service.download(created.id).await.unwrap();
        assert_eq!(bytes, b"%PDF-1.7".to_vec());

        let stored = f.store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(stored.last_downloaded, Some(f.clock.now()));
        assert_eq!(stored.status, Status::Pending);
    }

    #[tokio::test]
    async fn test_download_missing_document() {
        let f = fixture();
        let created = f
            .service
            .create(payload(Some("A1111AA"), None), "ADMIN")
            .await
            .unwrap();

        let result = f.service.download(created.id).await;
        assert!(matches!(result, Err(SarError::NotFound(_))));
        let stored = f.store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(stored.last_downloaded, None);
    }
}
