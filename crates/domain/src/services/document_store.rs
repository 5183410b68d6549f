//! Port to the external store holding generated reports.
//!
//! Documents are keyed by the id of the request that produced them.

use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

/// Result of asking the document store to delete a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// There was nothing to delete.
    NotFound,
    /// The document existed and was removed.
    NoContent,
    /// Any other HTTP status. The document may still exist.
    Other(u16),
}

impl DeleteOutcome {
    /// Whether the document is known to be absent after the call.
    pub fn is_gone(&self) -> bool {
        matches!(self, DeleteOutcome::NotFound | DeleteOutcome::NoContent)
    }

    pub fn from_status(status: u16) -> Self {
        match status {
            404 => DeleteOutcome::NotFound,
            204 => DeleteOutcome::NoContent,
            other => DeleteOutcome::Other(other),
        }
    }
}

/// Failures talking to the document store.
#[derive(Debug, Error)]
pub enum DocumentStoreError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),

    #[error("document store returned unexpected status {0}")]
    UnexpectedStatus(u16),
}

/// External blob store for generated reports.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn delete(&self, id: Uuid) -> Result<DeleteOutcome, DocumentStoreError>;

    /// The report bytes, or `None` when no document exists for `id`.
    async fn retrieve(&self, id: Uuid) -> Result<Option<Vec<u8>>, DocumentStoreError>;
}

/// Document store kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: Mutex<HashMap<Uuid, Vec<u8>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, id: Uuid, contents: Vec<u8>) {
        self.documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, contents);
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&id)
    }
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn delete(&self, id: Uuid) -> Result<DeleteOutcome, DocumentStoreError> {
        let removed = self
            .documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
        Ok(match removed {
            Some(_) => DeleteOutcome::NoContent,
            None => DeleteOutcome::NotFound,
        })
    }

    async fn retrieve(&self, id: Uuid) -> Result<Option<Vec<u8>>, DocumentStoreError> {
        Ok(self
            .documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned())
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use scripted::ScriptedDocumentStore;

#[cfg(any(test, feature = "test-support"))]
mod scripted {
    use super::*;

    #[derive(Debug, Clone, Copy)]
    enum DeleteScript {
        Respond(DeleteOutcome),
        Unreachable,
    }

    /// [`InMemoryDocumentStore`] whose deletes can be scripted per id and
    /// are recorded in call order.
    #[derive(Debug, Default)]
    pub struct ScriptedDocumentStore {
        inner: InMemoryDocumentStore,
        scripts: Mutex<HashMap<Uuid, DeleteScript>>,
        delete_calls: Mutex<Vec<Uuid>>,
    }

    impl ScriptedDocumentStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn put(&self, id: Uuid, contents: Vec<u8>) {
            self.inner.put(id, contents);
        }

        pub fn contains(&self, id: Uuid) -> bool {
            self.inner.contains(id)
        }

        /// Make every delete of `id` answer with `outcome` without touching
        /// the stored document.
        pub fn respond_to_delete(&self, id: Uuid, outcome: DeleteOutcome) {
            self.scripts
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(id, DeleteScript::Respond(outcome));
        }

        /// Make every delete of `id` fail as if the service were down.
        pub fn fail_delete(&self, id: Uuid) {
            self.scripts
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(id, DeleteScript::Unreachable);
        }

        /// Ids passed to `delete`, in call order.
        pub fn delete_calls(&self) -> Vec<Uuid> {
            self.delete_calls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        }
    }

    #[async_trait::async_trait]
    impl DocumentStore for ScriptedDocumentStore {
        async fn delete(&self, id: Uuid) -> Result<DeleteOutcome, DocumentStoreError> {
            self.delete_calls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(id);

            let script = self
                .scripts
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(&id)
                .copied();

            match script {
                Some(DeleteScript::Respond(outcome)) => Ok(outcome),
                Some(DeleteScript::Unreachable) => Err(DocumentStoreError::Unavailable(
                    "connection refused".to_string(),
                )),
                None => self.inner.delete(id).await,
            }
        }

        async fn retrieve(&self, id: Uuid) -> Result<Option<Vec<u8>>, DocumentStoreError> {
            self.inner.retrieve(id).await
        }
    }
}
