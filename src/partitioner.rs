//! Per-variable partitioning of canonical tables.
//!
//! A canonical table for one station-year is split into one file per declared
//! variable holding `time`, the value column and the attribute columns. Rows
//! where every one of those columns is null are dropped, and a variable with
//! no remaining rows produces no file at all.

use crate::constants::TIME_COLUMN;
use crate::error::Result;
use crate::layout::StoreLayout;
use crate::schema::VariableCatalog;
use crate::store::ColumnarStore;
use polars::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// variable -> row count
pub type VariableCounts = BTreeMap<String, usize>;

#[derive(Debug, Clone)]
pub struct VariablePartitioner {
    catalog: Arc<VariableCatalog>,
    layout: StoreLayout,
    store: Arc<dyn ColumnarStore>,
}

impl VariablePartitioner {
    pub fn new(
        catalog: Arc<VariableCatalog>,
        layout: StoreLayout,
        store: Arc<dyn ColumnarStore>,
    ) -> Self {
        Self {
            catalog,
            layout,
            store,
        }
    }

    pub fn catalog(&self) -> &VariableCatalog {
        &self.catalog
    }

    /// Write one partition per non-empty variable and return every count, zeros included
    pub fn export(&self, table: &DataFrame, station_id: &str, year: i32) -> Result<VariableCounts> {
        let mut counts = VariableCounts::new();
        for variable in self.catalog.variables() {
            let Some(mut subset) = self.variable_rows(table, variable)? else {
                counts.insert(variable.clone(), 0);
                continue;
            };

            let rows = subset.height();
            if rows > 0 {
                let path = self.layout.partition_file(station_id, year, variable);
                self.store.write(&path, &mut subset)?;
                debug!("Partitioned {} rows of {} for {} in {}", rows, variable, station_id, year);
            }
            counts.insert(variable.clone(), rows);
        }
        Ok(counts)
    }

    /// Same counts as [`export`](Self::export) without touching the store
    pub fn tally(&self, table: &DataFrame) -> Result<VariableCounts> {
        let mut counts = VariableCounts::new();
        for variable in self.catalog.variables() {
            let rows = self
                .variable_rows(table, variable)?
                .map_or(0, |subset| subset.height());
            counts.insert(variable.clone(), rows);
        }
        Ok(counts)
    }

    /// `time` plus the variable's columns, restricted to non-empty rows
    ///
    /// None when the table carries none of the variable's columns.
    fn variable_rows(&self, table: &DataFrame, variable: &str) -> PolarsResult<Option<DataFrame>> {
        let present: Vec<String> = self
            .catalog
            .columns_for(variable)
            .into_iter()
            .filter(|column| table.column(column).is_ok())
            .collect();
        if present.is_empty() {
            return Ok(None);
        }

        let mut mask = BooleanChunked::full("non_empty".into(), false, table.height());
        for column in &present {
            mask = &mask | &table.column(column)?.is_not_null();
        }

        let selected = table.select(std::iter::once(TIME_COLUMN.to_string()).chain(present))?;
        selected.filter(&mask).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::time_series;
    use crate::store::ParquetStore;
    use tempfile::TempDir;

    fn canonical_table() -> DataFrame {
        let time = time_series(vec![Some(0), Some(3_600_000), Some(7_200_000)]).unwrap();
        let precip = Series::new("precip".into(), [Some(0.2), None, Some(1.4)]);
        let precip_qc = Series::new(
            "precip_Quality_Code".into(),
            [Some("1"), Some("1"), None::<&str>],
        );
        let temperature = Series::new("temperature".into(), [None::<f64>, None, None]);
        DataFrame::new(vec![
            time.into(),
            precip.into(),
            precip_qc.into(),
            temperature.into(),
        ])
        .unwrap()
    }

    fn partitioner(root: &std::path::Path) -> VariablePartitioner {
        VariablePartitioner::new(
            Arc::new(VariableCatalog::new(["precip", "temperature", "wind_speed"])),
            StoreLayout::new(root),
            Arc::new(ParquetStore::default()),
        )
    }

    #[test]
    fn test_export_keeps_rows_with_any_attribute() {
        let temp = TempDir::new().unwrap();
        let partitioner = partitioner(temp.path());

        let counts = partitioner
            .export(&canonical_table(), "AB0001", 1970)
            .unwrap();
        // Row 2 has only a quality code and is still kept
        assert_eq!(counts["precip"], 3);

        let written = ParquetStore::default()
            .read(
                &StoreLayout::new(temp.path()).partition_file("AB0001", 1970, "precip"),
                None,
            )
            .unwrap();
        assert_eq!(written.height(), 3);
        assert_eq!(
            written
                .get_column_names()
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<_>>(),
            vec!["time", "precip", "precip_Quality_Code"]
        );
    }

    #[test]
    fn test_zero_count_writes_no_partition() {
        let temp = TempDir::new().unwrap();
        let partitioner = partitioner(temp.path());
        let layout = StoreLayout::new(temp.path());

        let counts = partitioner
            .export(&canonical_table(), "AB0001", 1970)
            .unwrap();

        assert_eq!(counts["temperature"], 0);
        assert_eq!(counts["wind_speed"], 0);
        assert!(!layout.partition_file("AB0001", 1970, "temperature").exists());
        assert!(!layout.partition_file("AB0001", 1970, "wind_speed").exists());
        assert_eq!(
            layout.list_partitions(partitioner.catalog().variables()).len(),
            1
        );
    }

    #[test]
    fn test_tally_matches_export_without_writing() {
        let temp = TempDir::new().unwrap();
        let partitioner = partitioner(temp.path());

        let tallied = partitioner.tally(&canonical_table()).unwrap();
        assert!(StoreLayout::new(temp.path())
            .list_partitions(partitioner.catalog().variables())
            .is_empty());

        let exported = partitioner
            .export(&canonical_table(), "AB0001", 1970)
            .unwrap();
        assert_eq!(tallied, exported);
    }
}
