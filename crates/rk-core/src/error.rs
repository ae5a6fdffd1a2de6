//! # AppError
//!
//! Centralized error handling for RankIt.
//! Maps domain-specific failures to actionable error types.

use thiserror::Error;

/// The primary error type for all rk-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., Post, Comment)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure (e.g., missing title, rating out of range)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Missing or invalid user identity
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Infrastructure failure (e.g., database unavailable, disk full)
    #[error("internal service error: {0}")]
    Internal(String),

    /// Resource already exists (e.g., duplicate account email)
    #[error("conflict: {0}")]
    Conflict(String),
}

impl AppError {
    pub fn not_found(kind: &str, id: impl ToString) -> Self {
        Self::NotFound(kind.to_string(), id.to_string())
    }

    /// Wraps a store failure. The cause is logged here so callers can return
    /// a generic message to clients.
    pub fn storage(context: &str, err: anyhow::Error) -> Self {
        log::error!("{context}: {err:#}");
        Self::Internal(format!("{context}: {err}"))
    }
}

/// A specialized Result type for RankIt logic.
pub type Result<T> = std::result::Result<T, AppError>;
