//! Two-step pipeline driver.
//!
//! Step 1 runs the by-year pass: partitions every available station-year and
//! records the by-year inventory. Step 2 runs the by-station pass over the
//! station-years the by-year layout lacks, reconciles both inventories and
//! rewrites the station list. Required artifacts are checked before any task
//! is scheduled; after the barrier every task's log buffer is replayed in
//! station order.

use crate::config::CurationConfig;
use crate::error::{CurationError, Result};
use crate::layout::StoreLayout;
use crate::logbuffer::{DeferredLogBuffer, LogSink, TracingSink};
use crate::models::{Step, StepReport, TaskResult};
use crate::orchestrator::{
    CurationTask, StationYears, TaskOrchestrator, plan_station_tasks, plan_year_tasks,
};
use crate::partitioner::VariablePartitioner;
use crate::reconcile::{Inventory, InventoryStore, StationListStore, merge, reconcile_stations};
use crate::schema::VariableCatalog;
use crate::source::{SourceReader, StationSource, YearSource};
use crate::store::{ColumnarStore, ParquetStore};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Run one step with optional pool overrides
pub async fn run(
    step: u8,
    workers: Option<usize>,
    memory_ceiling_mb: Option<u64>,
    mut config: CurationConfig,
) -> Result<StepReport> {
    let step = Step::try_from(step)?;
    if let Some(workers) = workers {
        config.workers = workers;
    }
    if let Some(ceiling_mb) = memory_ceiling_mb {
        config.memory_ceiling_mb = Some(ceiling_mb);
    }
    CurationPipeline::new(config)?.run_step(step).await
}

pub struct CurationPipeline {
    layout: StoreLayout,
    store: Arc<dyn ColumnarStore>,
    catalog: Arc<VariableCatalog>,
    orchestrator: TaskOrchestrator,
    sink: Box<dyn LogSink + Send + Sync>,
}

impl CurationPipeline {
    pub fn new(config: CurationConfig) -> Result<Self> {
        config.validate()?;
        let store: Arc<dyn ColumnarStore> = Arc::new(ParquetStore::new(config.compression));
        Ok(Self {
            layout: StoreLayout::new(config.dataset_root()),
            store,
            orchestrator: TaskOrchestrator::from_config(&config),
            catalog: Arc::new(config.catalog),
            sink: Box::new(TracingSink),
        })
    }

    /// Replay task logs into `sink` instead of `tracing`
    pub fn with_log_sink(mut self, sink: Box<dyn LogSink + Send + Sync>) -> Self {
        self.sink = sink;
        self
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub async fn run_step(&self, step: Step) -> Result<StepReport> {
        let started = Instant::now();
        let inventories = InventoryStore::new(self.layout.clone(), Arc::clone(&self.store));
        let station_years = inventories.read_station_year_inventory()?;
        let missing = inventories.read_missing_by_year()?;
        info!(
            "Step {}: {} station(s) inventoried, {} with missing by-year files",
            step.number(),
            station_years.len(),
            missing.len()
        );

        let mut report = match step {
            Step::YearSource => self.run_year_step(&inventories, &station_years, &missing).await?,
            Step::StationSource => {
                self.run_station_step(&inventories, &station_years, &missing)
                    .await?
            }
        };
        report.step = step.number();
        report.output_root = self.layout.root().to_path_buf();
        report.elapsed = started.elapsed();
        Ok(report)
    }

    async fn run_year_step(
        &self,
        inventories: &InventoryStore,
        station_years: &StationYears,
        missing: &StationYears,
    ) -> Result<StepReport> {
        let tasks = plan_year_tasks(station_years, missing);
        let reader = SourceReader::Year(YearSource::new(
            self.layout.clone(),
            Arc::clone(&self.store),
        ));
        let results = self.execute(tasks, reader).await;

        let inventory = Inventory::from_results(&results);
        inventories.write_snapshot(&inventory)?;
        inventories.update_variable_inventories(&inventory)?;

        Ok(StepReport {
            inventory_entries: inventory.len(),
            ..summarize(&results)
        })
    }

    async fn run_station_step(
        &self,
        inventories: &InventoryStore,
        station_years: &StationYears,
        missing: &StationYears,
    ) -> Result<StepReport> {
        let station_list = StationListStore::new(self.layout.clone(), Arc::clone(&self.store));
        let existing = station_list.read().map_err(|e| CurationError::UnreadableArtifact {
            path: self.layout.station_list(),
            reason: e.to_string(),
        })?;
        let year_inventory = inventories.read_snapshot()?;

        let known: BTreeSet<String> = existing.iter().map(|s| s.station_id.clone()).collect();
        let tasks = plan_station_tasks(station_years, missing, &known);
        let reader = SourceReader::Station(StationSource::new(
            self.layout.clone(),
            Arc::clone(&self.catalog),
        ));
        let results = self.execute(tasks, reader).await;

        // Tallied counts only matter where the by-year pass has a value to compare
        let overlap = Inventory::overlap_from_results(&results).restricted_to(&year_inventory);
        let station_inventory = overlap.union(&Inventory::from_results(&results));
        let (reconciled, conflicts) = merge(&year_inventory, &station_inventory);
        inventories.update_variable_inventories(&reconciled)?;

        let captured = results.iter().filter_map(|r| r.metadata.clone()).collect();
        let scope: BTreeSet<String> = station_years.keys().cloned().collect();
        let stations = reconcile_stations(existing, captured, &scope);
        station_list.write(&stations)?;
        info!(
            "Station list written: {} station(s), {} conflict(s)",
            stations.len(),
            conflicts.len()
        );

        Ok(StepReport {
            inventory_entries: reconciled.len(),
            conflicts: conflicts.iter().map(ToString::to_string).collect(),
            stations_emitted: Some(stations.len()),
            ..summarize(&results)
        })
    }

    /// Run the batch, wait at the barrier, then replay logs in station order
    async fn execute(
        &self,
        tasks: Vec<CurationTask>,
        reader: SourceReader,
    ) -> Vec<TaskResult> {
        let partitioner = Arc::new(VariablePartitioner::new(
            Arc::clone(&self.catalog),
            self.layout.clone(),
            Arc::clone(&self.store),
        ));
        let mut results = self.orchestrator.run(tasks, reader, partitioner).await;

        for result in &mut results {
            let owner = result.station_id.clone();
            let buffer = std::mem::replace(&mut result.log_buffer, DeferredLogBuffer::new(owner));
            buffer.flush(self.sink.as_ref());
        }
        debug!("Flushed logs for {} task(s)", results.len());
        results
    }
}

fn summarize(results: &[TaskResult]) -> StepReport {
    StepReport {
        tasks_run: results.len(),
        tasks_failed: results.iter().filter(|r| r.failed).count(),
        partitions_written: results.iter().map(|r| r.partitions_written).sum(),
        ..Default::default()
    }
}
