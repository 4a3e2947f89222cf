//! Standardized error codes for machine-parseable output.
//!
//! Error codes follow a numeric taxonomy:
//! - 2xx: Index errors
//! - 3xx: Config errors
//! - 4xx: Search errors
//! - 8xx: Validation errors

use serde::{Deserialize, Serialize};

/// Standardized error codes for structured error output.
///
/// Each variant maps to a numeric code (e.g., `IndexNotReady` -> E201).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================
    // Index errors (2xx)
    // ========================================
    /// E201: No index has been published yet, or a build is still running
    IndexNotReady,
    /// E202: The index builder reported a failed build
    IndexBuildFailed,
    /// E203: Index parts violate a structural invariant
    IndexInvalid,
    /// E204: Index dimension doesn't match the schema cardinality
    IndexDimensionMismatch,

    // ========================================
    // Config errors (3xx)
    // ========================================
    /// E302: Config file has invalid syntax or values
    ConfigInvalid,

    // ========================================
    // Search errors (4xx)
    // ========================================
    /// E401: Search strategy requires index data that is missing
    SearchStrategyUnavailable,

    // ========================================
    // Validation errors (8xx)
    // ========================================
    /// E801: Schema declaration is inconsistent
    SchemaInvalid,
}

impl ErrorCode {
    /// Get the numeric error code (e.g., `IndexNotReady` -> 201).
    #[must_use]
    pub const fn numeric(&self) -> u16 {
        match self {
            Self::IndexNotReady => 201,
            Self::IndexBuildFailed => 202,
            Self::IndexInvalid => 203,
            Self::IndexDimensionMismatch => 204,

            Self::ConfigInvalid => 302,

            Self::SearchStrategyUnavailable => 401,

            Self::SchemaInvalid => 801,
        }
    }

    /// Get the error code as a formatted string (e.g., "E201").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("E{}", self.numeric())
    }

    /// Get the default suggestion for this error code.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::IndexNotReady => "Hold the previous pose and retry the search on the next tick",
            Self::IndexBuildFailed => "Inspect the index builder logs and request a rebuild",
            Self::IndexInvalid => "Rebuild the index; the builder produced inconsistent parts",
            Self::IndexDimensionMismatch => {
                "Rebuild the index with the schema the database is configured for"
            }
            Self::ConfigInvalid => "Check the config file syntax and POSEMATCH_* variables",
            Self::SearchStrategyUnavailable => {
                "Build the index with the tree required by the configured search mode"
            }
            Self::SchemaInvalid => "Check channel offsets, cardinalities and the sample rate",
        }
    }

    /// Check if this error is potentially recoverable by the caller.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::IndexNotReady
            | Self::IndexBuildFailed
            | Self::ConfigInvalid
            | Self::SearchStrategyUnavailable => true,

            Self::IndexInvalid
            | Self::IndexDimensionMismatch
            | Self::SchemaInvalid => false,
        }
    }

    /// Get the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self.numeric() / 100 {
            2 => "index",
            3 => "config",
            4 => "search",
            8 => "validation",
            _ => "unknown",
        }
    }

    /// Iterate over all error codes.
    pub fn all() -> impl Iterator<Item = Self> {
        [
            Self::IndexNotReady,
            Self::IndexBuildFailed,
            Self::IndexInvalid,
            Self::IndexDimensionMismatch,
            Self::ConfigInvalid,
            Self::SearchStrategyUnavailable,
            Self::SchemaInvalid,
        ]
        .into_iter()
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E{}", self.numeric())
    }
}
