//! HTTP route handlers.

pub mod admin;
pub mod health;
pub mod subject_access_requests;
