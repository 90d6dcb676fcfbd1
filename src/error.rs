//! Error types for iiif-presentation
//!
//! Two layers:
//! - [`ReconcileError`] is what the painting core returns. It separates
//!   user-fixable input problems from internal invariant breaks.
//! - [`PresentationError`] is the crate-level error used by stores and services.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::painting::model::AssetId;

/// One rejected aspect of a submitted ordering, reported as (location, reason)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    pub location: String,
    pub message: String,
}

impl ValidationFailure {
    pub fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// A declared asset identity disagreed with an independently resolved one
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("Identity mismatch at {context}: declared {declared}, resolved {resolved}")]
pub struct IdentityMismatch {
    pub declared: AssetId,
    pub resolved: AssetId,
    pub context: String,
}

/// Internal merge invariant broken
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (canvas {canvas_original_id}: expected {expected}, got {actual})")]
pub struct CanvasPaintingMergerError {
    pub expected: String,
    pub actual: String,
    pub canvas_original_id: String,
    pub message: String,
}

/// Errors produced by canvas painting reconciliation
#[derive(Error, Debug, Clone)]
pub enum ReconcileError {
    #[error("Validation failed: {}", join_failures(.0))]
    Validation(Vec<ValidationFailure>),

    #[error("Identity mismatch: {}", join_mismatches(.0))]
    IdentityMismatch(Vec<IdentityMismatch>),

    #[error("Canvas painting merge failed: {0}")]
    Merger(#[from] CanvasPaintingMergerError),
}

impl ReconcileError {
    /// True when the client can fix the problem by changing its request
    pub fn is_user_error(&self) -> bool {
        !matches!(self, ReconcileError::Merger(_))
    }
}

impl From<IdentityMismatch> for ReconcileError {
    fn from(mismatch: IdentityMismatch) -> Self {
        ReconcileError::IdentityMismatch(vec![mismatch])
    }
}

fn join_failures(failures: &[ValidationFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_mismatches(mismatches: &[IdentityMismatch]) -> String {
    mismatches
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Coarse error classes, roughly 400 / 404 / 412 / 500
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    UserInput,
    NotFound,
    Precondition,
    Internal,
}

#[derive(Error, Debug)]
pub enum PresentationError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PresentationError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PresentationError::NotFound(_) => ErrorCategory::NotFound,
            PresentationError::PreconditionFailed(_) => ErrorCategory::Precondition,
            PresentationError::InvalidInput(_) => ErrorCategory::UserInput,
            PresentationError::Reconcile(e) if e.is_user_error() => ErrorCategory::UserInput,
            _ => ErrorCategory::Internal,
        }
    }
}

impl From<IdentityMismatch> for PresentationError {
    fn from(mismatch: IdentityMismatch) -> Self {
        PresentationError::Reconcile(mismatch.into())
    }
}
