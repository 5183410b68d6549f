//! Domain services for the SAR admin backend.
//!
//! Services contain the lifecycle rules; ports (`RequestStore`,
//! `DocumentStore`, `Notifier`, `Clock`) abstract over the outside world.

pub mod admin_query;
pub mod claim;
pub mod clock;
pub mod document_store;
pub mod in_memory_store;
pub mod notification;
pub mod requests;
pub mod store;

pub use admin_query::AdminQueryService;
pub use claim::{ClaimCoordinator, ClaimSettings};
pub use clock::{Clock, FixedClock, SystemClock};
pub use document_store::{DeleteOutcome, DocumentStore, DocumentStoreError, InMemoryDocumentStore};
#[cfg(any(test, feature = "test-support"))]
pub use document_store::ScriptedDocumentStore;
pub use in_memory_store::InMemoryRequestStore;
pub use notification::{AlertKind, AlertPayload, LogNotifier, Notifier, RecordingNotifier};
pub use requests::RequestService;
pub use store::{RequestStore, StatusUpdate, StoreError};
