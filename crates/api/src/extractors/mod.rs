//! Custom Axum extractors.

pub mod principal;

pub use principal::{Principal, PRINCIPAL_HEADER};
