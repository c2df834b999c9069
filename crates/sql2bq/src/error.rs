//! Error types for sql2bq.
//!
//! Every failure in the pipeline is expressed as an [`Error`]. Only source
//! introspection and stream-open failures abort a run; the rest are logged by
//! the pipeline and absorbed.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for sql2bq operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while copying a table.
///
/// Error codes follow the pattern `SQL2BQ-XXX` for easy grepping in logs.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or incomplete configuration (SQL2BQ-001).
    #[error("[SQL2BQ-001] Configuration error: {0}")]
    Config(String),

    /// Could not reach or authenticate against the source database (SQL2BQ-002).
    #[error("[SQL2BQ-002] Source connection error: {0}")]
    SourceConnection(String),

    /// Source introspection or row extraction failed (SQL2BQ-003).
    #[error("[SQL2BQ-003] Extraction error: {0}")]
    Extraction(String),

    /// Destination dataset or table already exists (SQL2BQ-004).
    #[error("[SQL2BQ-004] Already exists: {0}")]
    AlreadyExists(String),

    /// Destination temporarily unavailable (SQL2BQ-005).
    #[error("[SQL2BQ-005] Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Destination rate limit hit, retry after N seconds (SQL2BQ-006).
    #[error("[SQL2BQ-006] Rate limited, retry after {0}s")]
    RateLimit(u64),

    /// Credentials rejected by the destination (SQL2BQ-007).
    #[error("[SQL2BQ-007] Authentication error: {0}")]
    Authentication(String),

    /// Destination dataset or table does not exist (SQL2BQ-015).
    #[error("[SQL2BQ-015] Not found: {0}")]
    NotFound(String),

    /// Destination provisioning call failed (SQL2BQ-008).
    #[error("[SQL2BQ-008] Destination error: {0}")]
    Destination(String),

    /// Bulk insert call failed (SQL2BQ-009).
    #[error("[SQL2BQ-009] Loading error: {0}")]
    Loading(String),

    /// IO error (SQL2BQ-010).
    #[error("[SQL2BQ-010] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error (SQL2BQ-011).
    #[error("[SQL2BQ-011] Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML configuration parse error (SQL2BQ-012).
    #[error("[SQL2BQ-012] YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP transport error (SQL2BQ-013).
    #[error("[SQL2BQ-013] HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// MySQL driver error (SQL2BQ-014).
    #[cfg(feature = "mysql")]
    #[error("[SQL2BQ-014] Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Error {
    /// Returns the error code (e.g., "SQL2BQ-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "SQL2BQ-001",
            Self::SourceConnection(_) => "SQL2BQ-002",
            Self::Extraction(_) => "SQL2BQ-003",
            Self::AlreadyExists(_) => "SQL2BQ-004",
            Self::ServiceUnavailable(_) => "SQL2BQ-005",
            Self::RateLimit(_) => "SQL2BQ-006",
            Self::Authentication(_) => "SQL2BQ-007",
            Self::Destination(_) => "SQL2BQ-008",
            Self::NotFound(_) => "SQL2BQ-015",
            Self::Loading(_) => "SQL2BQ-009",
            Self::Io(_) => "SQL2BQ-010",
            Self::Serialization(_) => "SQL2BQ-011",
            Self::Yaml(_) => "SQL2BQ-012",
            Self::Http(_) => "SQL2BQ-013",
            #[cfg(feature = "mysql")]
            Self::Database(_) => "SQL2BQ-014",
        }
    }

    /// Whether the destination signalled a temporary condition.
    ///
    /// The dispatcher retries every failed attempt up to its ceiling; this only
    /// decides how the attempt is classified and logged.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ServiceUnavailable(_) | Self::RateLimit(_) | Self::Io(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Wait requested by the destination before the next call, if any.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit(secs) => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }

    /// Whether this is the "already exists" answer of an idempotent create.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}
