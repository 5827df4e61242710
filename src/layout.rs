//! Deterministic file layout of the GHCNh tree.
//!
//! ```text
//! GHCNh/
//!   data/
//!     by-year/<year>/GHCNh_<station>_<year>.parquet      (YearSource input)
//!     by-station/GHCNh_<station>_por.psv                 (StationSource input)
//!     <variable>/<year>/GHCNh_<station>_<year>-<variable>.parquet
//!   metadata/
//!     ghcnh-station-list.parquet
//!     ghcnh-inventory.parquet                            (station x year)
//!     ghcnh-inventory-<variable>.parquet
//!     ghcnh-station-year-missing-by-year.parquet
//!     ghcnh-inventory-by-year-source.parquet
//! ```

use crate::constants::{
    BY_STATION_DIR, BY_YEAR_DIR, DATA_DIR, METADATA_DIR, MISSING_BY_YEAR_FILE, STATION_LIST_FILE,
    STATION_YEAR_INVENTORY_FILE, YEAR_SOURCE_SNAPSHOT_FILE,
};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    /// Layout rooted at the `GHCNh/` directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join(METADATA_DIR)
    }

    pub fn year_source_file(&self, station_id: &str, year: i32) -> PathBuf {
        self.data_dir()
            .join(BY_YEAR_DIR)
            .join(year.to_string())
            .join(format!("GHCNh_{station_id}_{year}.parquet"))
    }

    pub fn station_source_file(&self, station_id: &str) -> PathBuf {
        self.data_dir()
            .join(BY_STATION_DIR)
            .join(format!("GHCNh_{station_id}_por.psv"))
    }

    pub fn partition_file(&self, station_id: &str, year: i32, variable: &str) -> PathBuf {
        self.data_dir()
            .join(variable)
            .join(year.to_string())
            .join(format!("GHCNh_{station_id}_{year}-{variable}.parquet"))
    }

    pub fn station_list(&self) -> PathBuf {
        self.metadata_dir().join(STATION_LIST_FILE)
    }

    pub fn station_year_inventory(&self) -> PathBuf {
        self.metadata_dir().join(STATION_YEAR_INVENTORY_FILE)
    }

    pub fn variable_inventory(&self, variable: &str) -> PathBuf {
        self.metadata_dir()
            .join(format!("ghcnh-inventory-{variable}.parquet"))
    }

    pub fn missing_by_year(&self) -> PathBuf {
        self.metadata_dir().join(MISSING_BY_YEAR_FILE)
    }

    pub fn year_source_snapshot(&self) -> PathBuf {
        self.metadata_dir().join(YEAR_SOURCE_SNAPSHOT_FILE)
    }

    /// All partition files currently under `data/<variable>/`
    pub fn list_partitions(&self, variables: &[String]) -> Vec<PathBuf> {
        let mut partitions: Vec<PathBuf> = variables
            .iter()
            .map(|variable| self.data_dir().join(variable))
            .filter(|dir| dir.exists())
            .flat_map(|dir| {
                WalkDir::new(dir)
                    .into_iter()
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_type().is_file())
                    .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "parquet"))
                    .map(|entry| entry.into_path())
            })
            .collect();
        partitions.sort();
        partitions
    }
}
