//! Bounded worker pool for per-station tasks.
//!
//! Tasks for one step are streamed through `buffer_unordered` with the
//! configured concurrency, each executing on a blocking thread. The pool
//! returns only once every task has produced a [`TaskResult`], which forms the
//! step barrier. Panics, timeouts and memory-ceiling refusals are all folded
//! into degraded results rather than surfaced as errors.

pub mod planning;
pub mod worker;

#[cfg(test)]
mod tests;

pub use self::planning::{CurationTask, StationYears, plan_station_tasks, plan_year_tasks};
pub use self::worker::execute_task;

use crate::config::{CurationConfig, SystemProfile};
use crate::constants::{PARQUET_EXPANSION_FACTOR, PSV_EXPANSION_FACTOR};
use crate::error::CurationError;
use crate::logbuffer::DeferredLogBuffer;
use crate::models::{SourceKind, TaskResult};
use crate::partitioner::VariablePartitioner;
use crate::source::SourceReader;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use sysinfo::System;
use tokio::task;
use tracing::debug;

/// Per-task work run on a blocking thread; the flag asks it to stop early
pub(crate) type TaskExecutor = dyn Fn(&CurationTask, &AtomicBool) -> TaskResult + Send + Sync;

/// Pool sizing and failure policy
#[derive(Debug, Clone)]
pub struct TaskOrchestrator {
    workers: usize,
    memory_ceiling_mb: Option<u64>,
    task_timeout: Option<Duration>,
    max_retries: usize,
    memory_pressure_threshold: f64,
    show_progress: bool,
}

impl TaskOrchestrator {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            memory_ceiling_mb: None,
            task_timeout: None,
            max_retries: 0,
            memory_pressure_threshold: 1.0,
            show_progress: false,
        }
    }

    pub fn from_config(config: &CurationConfig) -> Self {
        Self {
            workers: config.effective_workers(&SystemProfile::detect()),
            memory_ceiling_mb: config.memory_ceiling_mb,
            task_timeout: config.task_timeout,
            max_retries: config.max_retries,
            memory_pressure_threshold: config.memory_pressure_threshold,
            show_progress: config.show_progress,
        }
    }

    pub fn with_memory_ceiling_mb(mut self, ceiling_mb: Option<u64>) -> Self {
        self.memory_ceiling_mb = ceiling_mb;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every task and wait for all of them; results sorted by station id
    pub async fn run(
        &self,
        tasks: Vec<CurationTask>,
        reader: SourceReader,
        partitioner: Arc<VariablePartitioner>,
    ) -> Vec<TaskResult> {
        let kind = reader.kind();
        let mut refused = Vec::new();
        let tasks: Vec<CurationTask> = match self.memory_ceiling_mb {
            Some(ceiling_mb) => tasks
                .into_iter()
                .filter_map(|task| {
                    let estimate_mb = estimate_task_memory_mb(&task, &reader);
                    if estimate_mb <= ceiling_mb {
                        return Some(task);
                    }
                    refused.push(worker_failure(
                        &task.station_id,
                        format!("estimated {estimate_mb} MB exceeds the {ceiling_mb} MB worker ceiling"),
                        &[],
                    ));
                    None
                })
                .collect(),
            None => tasks,
        };

        let executor: Arc<TaskExecutor> =
            Arc::new(move |task: &CurationTask, cancel: &AtomicBool| {
                execute_task(task, &reader, &partitioner, cancel)
            });
        let mut results = self.run_with(tasks, kind, executor).await;
        results.append(&mut refused);
        results.sort_by(|a, b| a.station_id.cmp(&b.station_id));
        results
    }

    /// Drive `executor` over the pool with timeout and panic retry
    pub(crate) async fn run_with(
        &self,
        tasks: Vec<CurationTask>,
        kind: SourceKind,
        executor: Arc<TaskExecutor>,
    ) -> Vec<TaskResult> {
        if tasks.is_empty() {
            return Vec::new();
        }

        let mut concurrency = self.workers.min(tasks.len());
        if self.check_memory_pressure() {
            concurrency = (concurrency / 2).max(1);
            debug!("Memory pressure detected, reducing concurrency to {}", concurrency);
        }
        debug!(
            "Running {} {} task(s) on {} worker(s)",
            tasks.len(),
            kind,
            concurrency
        );

        let progress = self.progress_bar(tasks.len() as u64, kind);

        let mut results: Vec<TaskResult> = stream::iter(tasks)
            .map(|task| {
                let executor = Arc::clone(&executor);
                let progress = progress.clone();
                async move {
                    progress.set_message(task.station_id.clone());
                    let result = self.run_one(task, executor).await;
                    progress.inc(1);
                    result
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        progress.finish_with_message("done");
        results.sort_by(|a, b| a.station_id.cmp(&b.station_id));
        results
    }

    /// One task with timeout and panic retry
    ///
    /// A timed-out worker is cancelled and awaited, so it never outlives its
    /// pool slot.
    async fn run_one(&self, task: CurationTask, executor: Arc<TaskExecutor>) -> TaskResult {
        let task = Arc::new(task);
        let mut attempts: Vec<String> = Vec::new();
        loop {
            let cancel = Arc::new(AtomicBool::new(false));
            let mut handle = task::spawn_blocking({
                let task = Arc::clone(&task);
                let executor = Arc::clone(&executor);
                let cancel = Arc::clone(&cancel);
                move || executor(&*task, &*cancel)
            });

            let joined = match self.task_timeout {
                Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        cancel.store(true, Ordering::SeqCst);
                        let _ = handle.await;
                        return worker_failure(
                            &task.station_id,
                            format!("timed out after {limit:?}"),
                            &attempts,
                        );
                    }
                },
                None => handle.await,
            };

            match joined {
                Ok(mut result) => {
                    if !attempts.is_empty() {
                        result.log_buffer.warning(
                            "recovered after {} worker failure(s)",
                            &[&attempts.len()],
                        );
                    }
                    return result;
                }
                Err(join_error) => {
                    attempts.push(join_error.to_string());
                    if attempts.len() > self.max_retries {
                        return worker_failure(
                            &task.station_id,
                            format!("worker crashed: {join_error}"),
                            &attempts[..attempts.len() - 1],
                        );
                    }
                }
            }
        }
    }

    /// Host memory usage above the pressure threshold
    fn check_memory_pressure(&self) -> bool {
        let mut system = System::new();
        system.refresh_memory();

        let total_memory = system.total_memory() as f64;
        if total_memory == 0.0 {
            return false;
        }
        system.used_memory() as f64 / total_memory > self.memory_pressure_threshold
    }

    fn progress_bar(&self, total: u64, kind: SourceKind) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {prefix} ({eta}) {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_prefix(kind.to_string());
        pb
    }
}

/// Expected in-memory footprint of a task's inputs
pub fn estimate_task_memory_mb(task: &CurationTask, reader: &SourceReader) -> u64 {
    let factor = match reader.kind() {
        SourceKind::YearSource => PARQUET_EXPANSION_FACTOR,
        SourceKind::StationSource => PSV_EXPANSION_FACTOR,
    };
    let bytes: u64 = reader
        .input_paths(&task.station_id, &task.read_years())
        .iter()
        .filter_map(|path| std::fs::metadata(path).ok())
        .map(|meta| meta.len())
        .sum();
    (bytes * factor).div_ceil(1024 * 1024)
}

/// Degraded result for a worker that never returned its own
fn worker_failure(station_id: &str, reason: String, earlier: &[String]) -> TaskResult {
    let mut log = DeferredLogBuffer::new(station_id);
    for attempt in earlier {
        log.warning("worker attempt failed: {}", &[attempt]);
    }
    let failure = CurationError::WorkerFailure {
        station_id: station_id.to_string(),
        reason,
    };
    log.error("{}", &[&failure]);
    TaskResult::failed(station_id, log)
}
