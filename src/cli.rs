//! Command-line interface components.

use crate::config::{CompressionAlgorithm, CurationConfig, parse_memory_size_mb};
use crate::error::Result;
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "ghcnh-curator")]
#[command(about = "Repartition GHCNh hourly observations by variable, station and year")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    /// Directory holding the GHCNh/ tree (defaults to the user data directory)
    #[arg(long, value_name = "PATH")]
    pub data_root: Option<PathBuf>,

    /// Pipeline step: 1 = by-year pass, 2 = by-station pass and reconciliation
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
    pub step: u8,

    /// Number of concurrent worker tasks (defaults to one per core)
    #[arg(short = 'n', long = "ntasks", value_name = "WORKERS")]
    pub workers: Option<usize>,

    /// Per-worker memory ceiling, e.g. 512MB or 4GB
    #[arg(short, long, value_name = "SIZE")]
    pub memory: Option<String>,

    /// Per-task timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Retries granted to a crashed worker
    #[arg(long)]
    pub retries: Option<usize>,

    /// Parquet compression algorithm (snappy, zstd, lz4, none)
    #[arg(long, default_value = "snappy")]
    pub compression: String,

    /// Enable verbose logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub force: bool,
}

impl Args {
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }

    /// Parsed memory ceiling in MB
    pub fn memory_ceiling_mb(&self) -> Result<Option<u64>> {
        self.memory.as_deref().map(parse_memory_size_mb).transpose()
    }

    /// Configuration from defaults overridden by the flags
    ///
    /// Worker count and memory ceiling are passed to `run` separately.
    pub fn to_config(&self) -> Result<CurationConfig> {
        let mut config = match &self.data_root {
            Some(root) => CurationConfig::new(root),
            None => CurationConfig::default(),
        };
        config = config.with_compression(CompressionAlgorithm::parse(&self.compression)?);
        if let Some(secs) = self.timeout {
            config = config.with_task_timeout(Duration::from_secs(secs));
        }
        if let Some(retries) = self.retries {
            config = config.with_max_retries(retries);
        }
        if self.quiet {
            config = config.without_progress();
        }
        Ok(config)
    }
}

/// Ask before overwriting partitions and metadata under `target`
pub fn confirm(step: u8, target: &std::path::Path) -> io::Result<bool> {
    print!(
        "Step {step} will (re)write partitions and metadata under {}. Continue? [y/N] ",
        target.display()
    );
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_command_line() {
        let args = Args::parse_from([
            "ghcnh-curator",
            "--data-root",
            "/data",
            "--step",
            "2",
            "-n",
            "8",
            "-m",
            "4GB",
            "--timeout",
            "600",
            "-f",
        ]);

        assert_eq!(args.step, 2);
        assert_eq!(args.workers, Some(8));
        assert_eq!(args.memory_ceiling_mb().unwrap(), Some(4096));
        assert!(args.force);

        let config = args.to_config().unwrap();
        assert_eq!(config.dataset_root(), PathBuf::from("/data/GHCNh"));
        assert_eq!(config.task_timeout, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_log_levels() {
        let verbose = Args::parse_from(["ghcnh-curator", "--step", "1", "-v"]);
        assert_eq!(verbose.log_level(), "debug");
        let quiet = Args::parse_from(["ghcnh-curator", "--step", "1", "-q"]);
        assert_eq!(quiet.log_level(), "warn");
        assert!(!quiet.to_config().unwrap().show_progress);
    }

    #[test]
    fn test_step_out_of_range_rejected_before_prompt() {
        for step in ["0", "3"] {
            let err = Args::try_parse_from(["ghcnh-curator", "--step", step, "-f"]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }
        assert!(Args::try_parse_from(["ghcnh-curator", "--step", "2"]).is_ok());
    }

    #[test]
    fn test_bad_memory_size() {
        let args = Args::parse_from(["ghcnh-curator", "--step", "1", "-m", "plenty"]);
        assert!(args.memory_ceiling_mb().is_err());
    }
}
