//! Repository implementations for database operations.

pub mod subject_access_request;

pub use subject_access_request::PgRequestStore;
