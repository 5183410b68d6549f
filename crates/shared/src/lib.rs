//! Shared utilities and common types for the SAR admin backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Offset pagination arithmetic
//! - Field validation for request intake

pub mod pagination;
pub mod validation;
