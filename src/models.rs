//! Core data structures for GHCNh curation.
//!
//! Defines stations, per-task results, the two raw source kinds, pipeline
//! steps and the per-step report.

use crate::error::{CurationError, Result};
use crate::logbuffer::DeferredLogBuffer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// variable -> year -> count
pub type PartialInventory = BTreeMap<String, BTreeMap<i32, usize>>;

/// Static station metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub station_id: String,
    pub lat: f64,
    pub lon: f64,
    pub elevation: Option<f64>,
    pub name: String,
}

/// Raw layout a task reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// One Parquet file per station-year
    YearSource,
    /// One pipe-separated file per station, full period of record
    StationSource,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::YearSource => f.write_str("by-year"),
            SourceKind::StationSource => f.write_str("by-station"),
        }
    }
}

/// Outcome of one per-station task
///
/// Always well-formed: a failed task carries an empty inventory, no metadata
/// and a buffer explaining the failure. `overlap_inventory` holds counts
/// tallied without writing, for years another source owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub station_id: String,
    pub log_buffer: DeferredLogBuffer,
    pub partial_inventory: PartialInventory,
    pub overlap_inventory: PartialInventory,
    pub metadata: Option<Station>,
    pub failed: bool,
    pub partitions_written: usize,
}

impl TaskResult {
    /// Empty result for a task that produced nothing usable
    pub fn failed(station_id: impl Into<String>, log_buffer: DeferredLogBuffer) -> Self {
        Self {
            station_id: station_id.into(),
            log_buffer,
            partial_inventory: PartialInventory::new(),
            overlap_inventory: PartialInventory::new(),
            metadata: None,
            failed: true,
            partitions_written: 0,
        }
    }

    /// Sum of all counts in the partial inventory
    pub fn total_rows(&self) -> usize {
        self.partial_inventory
            .values()
            .flat_map(|years| years.values())
            .sum()
    }
}

/// The two non-overlapping pipeline steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    /// YearSource pass: partitions and initial inventory
    YearSource,
    /// StationSource pass: partitions, reconciliation, station list
    StationSource,
}

impl Step {
    pub fn number(&self) -> u8 {
        match self {
            Step::YearSource => 1,
            Step::StationSource => 2,
        }
    }

    pub fn source(&self) -> SourceKind {
        match self {
            Step::YearSource => SourceKind::YearSource,
            Step::StationSource => SourceKind::StationSource,
        }
    }
}

impl TryFrom<u8> for Step {
    type Error = CurationError;

    fn try_from(step: u8) -> Result<Self> {
        match step {
            1 => Ok(Step::YearSource),
            2 => Ok(Step::StationSource),
            other => Err(CurationError::InvalidStep { step: other }),
        }
    }
}

/// Statistics of one completed step
#[derive(Debug, Default)]
pub struct StepReport {
    pub step: u8,
    pub tasks_run: usize,
    pub tasks_failed: usize,
    pub partitions_written: usize,
    pub inventory_entries: usize,
    /// Rendered count conflicts, YearSource value kept in each
    pub conflicts: Vec<String>,
    pub stations_emitted: Option<usize>,
    pub output_root: PathBuf,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_parsing() {
        assert_eq!(Step::try_from(1).unwrap(), Step::YearSource);
        assert_eq!(Step::try_from(2).unwrap(), Step::StationSource);
        let err = Step::try_from(3).unwrap_err();
        assert!(matches!(err, CurationError::InvalidStep { step: 3 }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_failed_result_is_well_formed() {
        let result = TaskResult::failed("AB0001", DeferredLogBuffer::new("AB0001"));
        assert!(result.failed);
        assert!(result.partial_inventory.is_empty());
        assert!(result.overlap_inventory.is_empty());
        assert!(result.metadata.is_none());
        assert_eq!(result.total_rows(), 0);
    }

    #[test]
    fn test_total_rows() {
        let mut result = TaskResult::failed("AB0001", DeferredLogBuffer::new("AB0001"));
        result
            .partial_inventory
            .entry("precip".to_string())
            .or_default()
            .insert(2020, 24);
        result
            .partial_inventory
            .entry("temp".to_string())
            .or_default()
            .insert(2020, 6);
        assert_eq!(result.total_rows(), 30);
    }
}
