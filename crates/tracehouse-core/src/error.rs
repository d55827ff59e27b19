//! Core Error Types
//!
//! Errors raised while validating what callers hand to TraceHouse: principal ids,
//! opaque keys and the trace payload itself. Every variant here is a client/input
//! error; none of them indicates a fault inside the buffering pipeline.
//!
//! ## Usage
//!
//! All fallible functions in this crate return `Result<T>`, aliased to
//! `Result<T, CoreError>`, so `?` propagates cleanly into the storage layer.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid principal id: {0}")]
    InvalidPrincipal(String),

    #[error("Invalid key")]
    InvalidKey,

    #[error("Invalid key secret: {0}")]
    InvalidSecret(String),

    #[error("Duplicate value key: {0}")]
    DuplicateValueKey(String),

    #[error("Invalid trace: {0}")]
    InvalidTrace(String),
}
