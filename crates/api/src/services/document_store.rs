//! HTTP client for the external report store.

use std::time::Duration;

use domain::services::{DeleteOutcome, DocumentStore, DocumentStoreError};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::DocumentStoreConfig;

/// Document store reached over HTTP at `{base_url}/documents/{id}`.
#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    client: Client,
    base_url: String,
}

impl HttpDocumentStore {
    pub fn new(config: &DocumentStoreConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn document_url(&self, id: Uuid) -> String {
        format!("{}/documents/{}", self.base_url, id)
    }
}

fn unavailable(err: reqwest::Error) -> DocumentStoreError {
    DocumentStoreError::Unavailable(err.to_string())
}

#[async_trait::async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn delete(&self, id: Uuid) -> Result<DeleteOutcome, DocumentStoreError> {
        let response = self
            .client
            .delete(self.document_url(id))
            .send()
            .await
            .map_err(unavailable)?;

        let outcome = DeleteOutcome::from_status(response.status().as_u16());
        debug!(document_id = %id, outcome = ?outcome, "Document delete answered");
        Ok(outcome)
    }

    async fn retrieve(&self, id: Uuid) -> Result<Option<Vec<u8>>, DocumentStoreError> {
        let response = self
            .client
            .get(self.document_url(id))
            .send()
            .await
            .map_err(unavailable)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let bytes = response.bytes().await.map_err(unavailable)?;
                Ok(Some(bytes.to_vec()))
            }
            status => {
                warn!(document_id = %id, status = status.as_u16(), "Unexpected document store response");
                Err(DocumentStoreError::UnexpectedStatus(status.as_u16()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(base_url: &str) -> HttpDocumentStore {
        HttpDocumentStore::new(&DocumentStoreConfig {
            base_url: base_url.to_string(),
            timeout_ms: 500,
        })
        .unwrap()
    }

    #[test]
    fn test_document_url_strips_trailing_slash() {
        let id = Uuid::nil();
        assert_eq!(
            store("http://docs.local/").document_url(id),
            format!("http://docs.local/documents/{id}")
        );
    }

    #[tokio::test]
    async fn test_unreachable_store_is_unavailable() {
        let documents = store("http://127.0.0.1:1");

        let delete = documents.delete(Uuid::new_v4()).await;
        assert!(matches!(delete, Err(DocumentStoreError::Unavailable(_))));

        let retrieve = documents.retrieve(Uuid::new_v4()).await;
        assert!(matches!(retrieve, Err(DocumentStoreError::Unavailable(_))));
    }
}
