//! Pipeline error taxonomy
//!
//! Every stage reports failures as an [`IngestError`]. The variant decides the
//! [`ErrorKind`] reported to invokers, the [`Stage`] it is attributed to, and
//! whether re-running the whole invocation is expected to help.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Source object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Write error: {0}")]
    Write(String),

    #[error("Archive error: {0}")]
    Archive(String),
}

/// Stable, serialisable classification of an [`IngestError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    SourceUnavailable,
    ParseError,
    SchemaMismatch,
    CatalogUnavailable,
    WriteError,
    ArchiveError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::NotFound => "not_found",
            ErrorKind::SourceUnavailable => "source_unavailable",
            ErrorKind::ParseError => "parse_error",
            ErrorKind::SchemaMismatch => "schema_mismatch",
            ErrorKind::CatalogUnavailable => "catalog_unavailable",
            ErrorKind::WriteError => "write_error",
            ErrorKind::ArchiveError => "archive_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Resolve,
    Read,
    Write,
    Archive,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Resolve => "resolve",
            Stage::Read => "read",
            Stage::Write => "write",
            Stage::Archive => "archive",
        })
    }
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            IngestError::NotFound { .. } => ErrorKind::NotFound,
            IngestError::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
            IngestError::Parse(_) => ErrorKind::ParseError,
            IngestError::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            IngestError::CatalogUnavailable(_) => ErrorKind::CatalogUnavailable,
            IngestError::Write(_) => ErrorKind::WriteError,
            IngestError::Archive(_) => ErrorKind::ArchiveError,
        }
    }

    pub fn stage(&self) -> Stage {
        match self.kind() {
            ErrorKind::InvalidArgument => Stage::Resolve,
            ErrorKind::NotFound
            | ErrorKind::SourceUnavailable
            | ErrorKind::ParseError
            | ErrorKind::SchemaMismatch => Stage::Read,
            ErrorKind::CatalogUnavailable | ErrorKind::WriteError => Stage::Write,
            ErrorKind::ArchiveError => Stage::Archive,
        }
    }

    /// Whether re-running the same invocation unchanged may succeed.
    ///
    /// Data-quality and argument errors need a fixed input first; a missing
    /// source is left to the caller to decide.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::SourceUnavailable
                | ErrorKind::CatalogUnavailable
                | ErrorKind::WriteError
                | ErrorKind::ArchiveError
        )
    }
}

/// Serialisable error description carried by results and response envelopes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub stage: Stage,
    pub message: String,
    pub retryable: bool,
}

impl From<&IngestError> for ErrorDetail {
    fn from(err: &IngestError) -> Self {
        Self {
            kind: err.kind(),
            stage: err.stage(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}
