//! Error handling for posematch.
//!
//! This module provides:
//! - [`MatchError`]: The error enum for every fallible posematch operation
//! - [`ErrorCode`]: Standardized error codes for machine parsing
//! - [`StructuredError`]: Serializable error with suggestion and context
//!
//! Searches themselves never fail: an index that is still building or a fully
//! filtered database both produce an empty [`crate::SearchResult`]. Errors here
//! come from assembling indices, declaring schemas, publishing and loading
//! config.

mod codes;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use codes::ErrorCode;

/// Main error type for posematch operations.
#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Index not ready: {0}")]
    IndexNotReady(String),

    #[error("Index build failed: {0}")]
    IndexBuildFailed(String),

    #[error("Invalid search index: {0}")]
    InvalidIndex(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Search strategy {mode} unavailable: {reason}")]
    StrategyUnavailable { mode: String, reason: String },

    #[error("Config error: {0}")]
    Config(String),
}

impl MatchError {
    /// Get the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::IndexNotReady(_) => ErrorCode::IndexNotReady,
            Self::IndexBuildFailed(_) => ErrorCode::IndexBuildFailed,
            Self::InvalidIndex(_) => ErrorCode::IndexInvalid,
            Self::DimensionMismatch { .. } => ErrorCode::IndexDimensionMismatch,
            Self::InvalidSchema(_) => ErrorCode::SchemaInvalid,
            Self::StrategyUnavailable { .. } => ErrorCode::SearchStrategyUnavailable,
            Self::Config(_) => ErrorCode::ConfigInvalid,
        }
    }

    /// Get context information for this error as JSON.
    #[must_use]
    pub fn context(&self) -> Option<Value> {
        match self {
            Self::DimensionMismatch { expected, actual } => {
                Some(serde_json::json!({ "expected": expected, "actual": actual }))
            }
            Self::StrategyUnavailable { mode, reason } => {
                Some(serde_json::json!({ "mode": mode, "reason": reason }))
            }
            _ => None,
        }
    }

    /// Convert this error to a structured error.
    #[must_use]
    pub fn to_structured(&self) -> StructuredError {
        StructuredError::from_match_error(self)
    }
}

/// A structured error with machine-readable code, suggestion, and context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// The error code (e.g., "INDEX_NOT_READY")
    pub code: ErrorCode,

    /// The numeric error code (e.g., 201)
    pub numeric_code: u16,

    /// Human-readable error message
    pub message: String,

    /// Actionable suggestion for recovery
    pub suggestion: String,

    /// Additional context for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    /// Whether the caller can recover without a code change
    pub recoverable: bool,

    /// Error category (e.g., "index", "config")
    pub category: String,
}

impl StructuredError {
    /// Create a new structured error.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            numeric_code: code.numeric(),
            suggestion: code.suggestion().to_string(),
            context: None,
            recoverable: code.is_recoverable(),
            category: code.category().to_string(),
            code,
            message: message.into(),
        }
    }

    /// Create a structured error from a [`MatchError`].
    #[must_use]
    pub fn from_match_error(err: &MatchError) -> Self {
        Self::new(err.code(), err.to_string()).with_optional_context(err.context())
    }

    /// Add context to this error.
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    fn with_optional_context(mut self, context: Option<Value>) -> Self {
        self.context = context;
        self
    }

    /// Set a custom suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl From<MatchError> for StructuredError {
    fn from(err: MatchError) -> Self {
        Self::from_match_error(&err)
    }
}

impl From<&MatchError> for StructuredError {
    fn from(err: &MatchError) -> Self {
        Self::from_match_error(err)
    }
}

/// Result type alias using [`MatchError`].
pub type Result<T> = std::result::Result<T, MatchError>;
