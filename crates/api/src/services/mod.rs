//! External service integrations.

pub mod document_store;
pub mod notifier;

pub use document_store::HttpDocumentStore;
pub use notifier::WebhookNotifier;
