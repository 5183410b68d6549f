//! Domain layer for the SAR admin backend.
//!
//! This crate contains:
//! - The subject access request model and its lifecycle rules
//! - Ports for storage, documents, notifications and time
//! - The claim coordinator and the intake/admin services built on the ports
//! - Domain error types

pub mod error;
pub mod models;
pub mod services;

pub use error::SarError;
