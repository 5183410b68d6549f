//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod subject_access_request;

pub use subject_access_request::{SarStatusDb, SubjectAccessRequestEntity};
