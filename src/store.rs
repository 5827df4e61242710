//! Columnar file store.
//!
//! The pipeline only needs `read(path, columns?)` and `write(path, table)`;
//! everything else about the physical format lives behind [`ColumnarStore`].

use crate::config::CompressionAlgorithm;
use crate::error::{CurationError, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Physical reader/writer for columnar tables
pub trait ColumnarStore: Send + Sync + std::fmt::Debug {
    /// Read a table, optionally restricted to `columns`
    fn read(&self, path: &Path, columns: Option<&[&str]>) -> Result<DataFrame>;

    /// Write a table, creating parent directories and replacing any existing file
    fn write(&self, path: &Path, table: &mut DataFrame) -> Result<()>;

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Parquet-backed store
#[derive(Debug, Clone)]
pub struct ParquetStore {
    compression: CompressionAlgorithm,
}

impl Default for ParquetStore {
    fn default() -> Self {
        Self::new(CompressionAlgorithm::Snappy)
    }
}

impl ParquetStore {
    pub fn new(compression: CompressionAlgorithm) -> Self {
        Self { compression }
    }
}

impl ColumnarStore for ParquetStore {
    fn read(&self, path: &Path, columns: Option<&[&str]>) -> Result<DataFrame> {
        if !path.is_file() {
            return Err(CurationError::MissingInput {
                path: path.to_path_buf(),
            });
        }

        let file = File::open(path)?;
        let projection = columns.map(|cols| cols.iter().map(|c| c.to_string()).collect());
        let table = ParquetReader::new(file).with_columns(projection).finish()?;

        debug!(
            "Read {} rows x {} columns from {}",
            table.height(),
            table.width(),
            path.display()
        );
        Ok(table)
    }

    fn write(&self, path: &Path, table: &mut DataFrame) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = File::create(path)?;
        ParquetWriter::new(file)
            .with_compression(self.compression.to_polars_compression())
            .finish(table)
            .map_err(|e| CurationError::StoreWrite {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        debug!("Wrote {} rows to {}", table.height(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read_projection() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("table.parquet");
        let store = ParquetStore::default();

        let mut table = df!(
            "station_id" => ["AB0001", "AB0002"],
            "year" => [2020i32, 2021],
            "count" => [24u64, 3],
        )
        .unwrap();
        store.write(&path, &mut table).unwrap();
        assert!(store.exists(&path));

        let projected = store.read(&path, Some(&["station_id", "count"])).unwrap();
        assert_eq!(projected.width(), 2);
        assert_eq!(projected.height(), 2);
    }

    #[test]
    fn test_missing_file_is_missing_input() {
        let temp = TempDir::new().unwrap();
        let store = ParquetStore::default();
        let err = store
            .read(&temp.path().join("absent.parquet"), None)
            .unwrap_err();
        assert!(matches!(err, CurationError::MissingInput { .. }));
    }
}
