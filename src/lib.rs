//! GHCNh Curator Library
//!
//! Curates GHCNh hourly weather-station archives into a per-variable,
//! per-station, per-year partitioned Parquet store.
//!
//! This library provides tools for:
//! - Parsing both raw layouts (by-year Parquet, by-station pipe-separated files)
//!   into canonical timestamp-indexed tables
//! - Splitting canonical tables into one partition per non-empty variable-year
//! - Running failure-isolated per-station tasks on a bounded worker pool with
//!   deferred, replayable logging
//! - Reconciling record counts from the two layouts and maintaining the
//!   station list

pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod layout;
pub mod logbuffer;
pub mod models;
pub mod orchestrator;
pub mod partitioner;
pub mod pipeline;
pub mod reconcile;
pub mod schema;
pub mod source;
pub mod store;

// Re-export commonly used types
pub use config::{CompressionAlgorithm, CurationConfig};
pub use error::{CurationError, ParsePhase, Result};
pub use logbuffer::{DeferredLogBuffer, LogLevel, LogSink, TracingSink};
pub use models::{SourceKind, Station, Step, StepReport, TaskResult};
pub use pipeline::{CurationPipeline, run};
pub use schema::VariableCatalog;
