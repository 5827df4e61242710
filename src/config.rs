//! Configuration management and validation.
//!
//! Provides the run configuration (data root, worker pool sizing, per-worker
//! memory ceiling, timeout and retry policy, output compression) together
//! with the injected variable catalog.

use crate::constants::{
    DATASET_DIR_NAME, DEFAULT_DATA_ROOT_DIR, DEFAULT_MAX_RETRIES,
    DEFAULT_MEMORY_PRESSURE_THRESHOLD,
};
use crate::error::{CurationError, Result};
use crate::schema::VariableCatalog;
use polars::prelude::ParquetCompression;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

/// Supported compression algorithms for parquet files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionAlgorithm {
    /// Snappy compression - good balance of speed and compression
    Snappy,
    /// ZSTD compression - better compression ratio, slower
    Zstd,
    /// LZ4 compression - fastest, lower compression ratio
    Lz4,
    /// No compression
    Uncompressed,
}

impl CompressionAlgorithm {
    /// Convert to polars ParquetCompression type
    pub fn to_polars_compression(&self) -> ParquetCompression {
        match self {
            CompressionAlgorithm::Snappy => ParquetCompression::Snappy,
            CompressionAlgorithm::Zstd => ParquetCompression::Zstd(None),
            CompressionAlgorithm::Lz4 => ParquetCompression::Lz4Raw,
            CompressionAlgorithm::Uncompressed => ParquetCompression::Uncompressed,
        }
    }

    /// Parse the CLI spelling (snappy, zstd, lz4, none)
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "snappy" => Ok(CompressionAlgorithm::Snappy),
            "zstd" => Ok(CompressionAlgorithm::Zstd),
            "lz4" => Ok(CompressionAlgorithm::Lz4),
            "none" | "uncompressed" => Ok(CompressionAlgorithm::Uncompressed),
            other => Err(CurationError::Configuration {
                message: format!("unknown compression algorithm '{other}'"),
            }),
        }
    }
}

/// System profiling information for pool sizing
#[derive(Debug, Clone)]
pub struct SystemProfile {
    /// Number of CPU cores available
    pub cpu_cores: usize,
    /// Total memory in MB
    pub memory_mb: u64,
}

impl SystemProfile {
    /// Auto-detect system capabilities
    pub fn detect() -> Self {
        use sysinfo::System;

        let mut system = System::new();
        system.refresh_memory();

        Self {
            cpu_cores: num_cpus::get(),
            memory_mb: system.total_memory() / 1024 / 1024,
        }
    }
}

/// Global configuration for a curation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurationConfig {
    /// Root directory holding the `GHCNh/` tree
    pub data_root: PathBuf,

    /// Number of tasks running concurrently
    pub workers: usize,

    /// Per-worker memory ceiling in MB (None = no cap)
    pub memory_ceiling_mb: Option<u64>,

    /// Per-task timeout (None = wait indefinitely)
    pub task_timeout: Option<Duration>,

    /// Retries granted to a worker that panicked
    pub max_retries: usize,

    /// Host memory usage fraction above which concurrency is halved
    pub memory_pressure_threshold: f64,

    /// Compression of every emitted Parquet file
    pub compression: CompressionAlgorithm,

    /// Show progress bars while tasks run
    pub show_progress: bool,

    /// Declared variables and attribute columns
    pub catalog: VariableCatalog,
}

impl Default for CurationConfig {
    fn default() -> Self {
        let data_root = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_DATA_ROOT_DIR);

        Self {
            data_root,
            workers: num_cpus::get(),
            memory_ceiling_mb: None,
            task_timeout: None,
            max_retries: DEFAULT_MAX_RETRIES,
            memory_pressure_threshold: DEFAULT_MEMORY_PRESSURE_THRESHOLD,
            compression: CompressionAlgorithm::Snappy,
            show_progress: true,
            catalog: VariableCatalog::default(),
        }
    }
}

impl CurationConfig {
    /// Configuration rooted at `data_root` with default pool settings
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            ..Default::default()
        }
    }

    /// Set the worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the per-worker memory ceiling in MB
    pub fn with_memory_ceiling_mb(mut self, ceiling_mb: u64) -> Self {
        self.memory_ceiling_mb = Some(ceiling_mb);
        self
    }

    /// Set the per-task timeout
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    /// Set the retry budget for panicked workers
    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the output compression
    pub fn with_compression(mut self, compression: CompressionAlgorithm) -> Self {
        self.compression = compression;
        self
    }

    /// Substitute the variable catalog
    pub fn with_catalog(mut self, catalog: VariableCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Disable progress bars (tests, quiet mode)
    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    /// Directory holding the GHCNh tree
    pub fn dataset_root(&self) -> PathBuf {
        self.data_root.join(DATASET_DIR_NAME)
    }

    /// Worker count the host can hold at the memory ceiling
    ///
    /// With a ceiling set, no more workers run than `memory_mb / ceiling`
    /// (at least one). An undetected host memory size leaves the count as is.
    pub fn effective_workers(&self, profile: &SystemProfile) -> usize {
        let workers = self.workers.max(1);
        match self.memory_ceiling_mb {
            Some(ceiling_mb) if ceiling_mb > 0 && profile.memory_mb > 0 => {
                let fit = (profile.memory_mb / ceiling_mb).max(1) as usize;
                if fit < workers {
                    debug!(
                        "Capping workers at {} ({} MB host, {} MB ceiling)",
                        fit, profile.memory_mb, ceiling_mb
                    );
                }
                workers.min(fit)
            }
            _ => workers,
        }
    }

    /// Reject configurations that cannot schedule any task
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(CurationError::Configuration {
                message: "worker count must be at least 1".to_string(),
            });
        }
        if self.memory_ceiling_mb == Some(0) {
            return Err(CurationError::Configuration {
                message: "memory ceiling must be positive".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.memory_pressure_threshold) {
            return Err(CurationError::Configuration {
                message: format!(
                    "memory pressure threshold {} outside [0, 1]",
                    self.memory_pressure_threshold
                ),
            });
        }
        if self.catalog.is_empty() {
            return Err(CurationError::Configuration {
                message: "variable catalog is empty".to_string(),
            });
        }

        debug!(
            "Configuration validated: {} workers, ceiling {:?}MB, timeout {:?}, {} retries",
            self.workers, self.memory_ceiling_mb, self.task_timeout, self.max_retries
        );
        Ok(())
    }
}

/// Parse a memory size such as `512MB`, `4GB`, `1.5G` or a bare MB count
pub fn parse_memory_size_mb(input: &str) -> Result<u64> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*(\d+(?:\.\d+)?)\s*(k|m|g|t)?i?b?\s*$").expect("valid memory regex")
    });

    let invalid = || CurationError::Configuration {
        message: format!("invalid memory size '{input}' (expected e.g. 512MB, 4GB)"),
    };

    let captures = pattern.captures(input).ok_or_else(invalid)?;
    let amount: f64 = captures[1].parse().map_err(|_| invalid())?;
    let multiplier = match captures.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(unit) if unit == "k" => 1.0 / 1024.0,
        Some(unit) if unit == "g" => 1024.0,
        Some(unit) if unit == "t" => 1024.0 * 1024.0,
        _ => 1.0,
    };

    let megabytes = (amount * multiplier).ceil() as u64;
    if megabytes == 0 {
        return Err(invalid());
    }
    Ok(megabytes)
}
