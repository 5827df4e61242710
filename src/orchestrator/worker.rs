//! Execution of a single task on a blocking worker thread.
//!
//! Nothing here logs directly: every message goes into the task's
//! [`DeferredLogBuffer`] and is replayed after the step barrier.

use super::planning::CurationTask;
use crate::logbuffer::DeferredLogBuffer;
use crate::models::{PartialInventory, SourceKind, TaskResult};
use crate::partitioner::{VariableCounts, VariablePartitioner};
use crate::source::SourceReader;
use std::sync::atomic::{AtomicBool, Ordering};

/// Run one task to completion; never fails, degraded outcomes are flagged
///
/// `cancel` is checked before every partition write and tally; once set the
/// task stops and returns an empty failed result.
pub fn execute_task(
    task: &CurationTask,
    reader: &SourceReader,
    partitioner: &VariablePartitioner,
    cancel: &AtomicBool,
) -> TaskResult {
    let mut log = DeferredLogBuffer::new(task.station_id.as_str());
    let read_years = task.read_years();
    log.debug(
        "reading {} year(s) from {} source",
        &[&read_years.len(), &reader.kind()],
    );

    let metadata_from = (task.needs_metadata && reader.kind() == SourceKind::StationSource)
        .then_some(task.export_years.as_slice());

    let read = match reader.read(&task.station_id, &read_years, metadata_from) {
        Ok(read) => read,
        Err(e) => {
            log.error("skipping station: {}", &[&e]);
            return TaskResult::failed(task.station_id.as_str(), log);
        }
    };
    if let Some(e) = &read.metadata_error {
        log.error("metadata not captured: {}", &[e]);
    }

    let mut partial_inventory = PartialInventory::new();
    let mut partitions_written = 0;
    for &year in &task.export_years {
        let Some(table) = read.tables.get(&year) else {
            log.debug("no rows for {}", &[&year]);
            continue;
        };

        if cancel.load(Ordering::SeqCst) {
            log.error("cancelled before partitioning {}", &[&year]);
            return TaskResult::failed(task.station_id.as_str(), log);
        }
        match partitioner.export(table, &task.station_id, year) {
            Ok(counts) => {
                partitions_written += fold_counts(&mut partial_inventory, year, &counts);
                log.debug("{}: {} row(s) partitioned", &[&year, &table.height()]);
            }
            Err(e) => {
                log.error("partitioning {} failed: {}", &[&year, &e]);
                return TaskResult::failed(task.station_id.as_str(), log);
            }
        }
    }

    let mut overlap_inventory = PartialInventory::new();
    for &year in &task.tally_years {
        let Some(table) = read.tables.get(&year) else {
            continue;
        };
        if cancel.load(Ordering::SeqCst) {
            log.error("cancelled before tallying {}", &[&year]);
            return TaskResult::failed(task.station_id.as_str(), log);
        }
        match partitioner.tally(table) {
            Ok(counts) => {
                fold_counts(&mut overlap_inventory, year, &counts);
            }
            Err(e) => log.warning("tallying {} failed: {}", &[&year, &e]),
        }
    }

    if task.needs_metadata {
        match &read.metadata {
            Some(station) => log.info(
                "captured metadata: {} ({}, {})",
                &[&station.name, &station.lat, &station.lon],
            ),
            None => log.warning("no metadata captured", &[]),
        }
    }

    log.info(
        "{} partition(s) written across {} year(s)",
        &[&partitions_written, &task.export_years.len()],
    );

    TaskResult {
        station_id: task.station_id.clone(),
        log_buffer: log,
        partial_inventory,
        overlap_inventory,
        metadata: read.metadata,
        failed: false,
        partitions_written,
    }
}

/// Fold nonzero counts for one year; returns how many were folded
fn fold_counts(inventory: &mut PartialInventory, year: i32, counts: &VariableCounts) -> usize {
    let mut folded = 0;
    for (variable, &count) in counts {
        if count > 0 {
            inventory
                .entry(variable.clone())
                .or_default()
                .insert(year, count);
            folded += 1;
        }
    }
    folded
}
