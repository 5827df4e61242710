//! Error handling for GHCNh curation operations.
//!
//! Per-task errors (missing inputs, phase-tagged parse failures, worker
//! failures) are captured into deferred log buffers and never abort a step.
//! Configuration errors are raised before any task is scheduled.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Processing phase in which a raw source failed to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsePhase {
    Read,
    TypeCoercion,
    YearFilter,
    TimestampConstruction,
    ColumnPruning,
    MetadataCapture,
}

impl fmt::Display for ParsePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ParsePhase::Read => "read",
            ParsePhase::TypeCoercion => "type coercion",
            ParsePhase::YearFilter => "year filter",
            ParsePhase::TimestampConstruction => "timestamp construction",
            ParsePhase::ColumnPruning => "column pruning",
            ParsePhase::MetadataCapture => "metadata capture",
        };
        f.write_str(tag)
    }
}

#[derive(Error, Debug)]
pub enum CurationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Missing input file: {path}")]
    MissingInput { path: PathBuf },

    #[error("[{phase}] failed for {path}: {reason}")]
    ParseFailure {
        phase: ParsePhase,
        path: PathBuf,
        reason: String,
    },

    #[error("Worker failure for station {station_id}: {reason}")]
    WorkerFailure { station_id: String, reason: String },

    #[error("Failed to write {path}: {reason}")]
    StoreWrite { path: PathBuf, reason: String },

    #[error("Invalid step {step}: choose 1 or 2")]
    InvalidStep { step: u8 },

    #[error("Unreadable required artifact {path}: {reason}")]
    UnreadableArtifact { path: PathBuf, reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl CurationError {
    /// Build a phase-tagged parse failure
    pub fn parse(phase: ParsePhase, path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self::ParseFailure {
            phase,
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Errors that abort a whole run rather than a single task
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CurationError::InvalidStep { .. }
                | CurationError::UnreadableArtifact { .. }
                | CurationError::Configuration { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CurationError>;
