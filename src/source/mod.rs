//! Raw source readers.
//!
//! GHCNh is delivered in two incompatible layouts. Both readers turn raw input
//! into canonical tables: a `time` column (millisecond datetime) followed by one
//! value column and its attribute columns per variable, with the
//! station-identifying columns removed.

pub mod station;
pub mod year;

pub use self::station::StationSource;
pub use self::year::YearSource;

use crate::constants::TIME_COLUMN;
use crate::error::{CurationError, ParsePhase, Result};
use crate::models::{SourceKind, Station};
use chrono::{DateTime, Datelike};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Canonical per-year tables produced by one read
///
/// A failed metadata capture does not fail the read; the error is kept in
/// `metadata_error` and the tables are still produced.
#[derive(Debug, Default)]
pub struct SourceRead {
    pub tables: BTreeMap<i32, DataFrame>,
    pub metadata: Option<Station>,
    pub metadata_error: Option<CurationError>,
}

/// Tagged variant over the two raw layouts
#[derive(Debug, Clone)]
pub enum SourceReader {
    Year(YearSource),
    Station(StationSource),
}

impl SourceReader {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceReader::Year(_) => SourceKind::YearSource,
            SourceReader::Station(_) => SourceKind::StationSource,
        }
    }

    /// Produce canonical tables for `station_id` restricted to `years`
    ///
    /// `metadata_from` requests station metadata from the first row of those
    /// years (falling back to the first row read); only the by-station layout
    /// carries it. A capture failure is reported in the result, not as an error.
    pub fn read(
        &self,
        station_id: &str,
        years: &[i32],
        metadata_from: Option<&[i32]>,
    ) -> Result<SourceRead> {
        match self {
            SourceReader::Year(source) => {
                let mut tables = BTreeMap::new();
                for &year in years {
                    tables.insert(year, source.read(station_id, year)?);
                }
                Ok(SourceRead {
                    tables,
                    ..Default::default()
                })
            }
            SourceReader::Station(source) => {
                let raw = source.load(station_id, years)?;
                let (metadata, metadata_error) = match metadata_from
                    .map(|preferred| source.capture_metadata(station_id, &raw, preferred))
                {
                    Some(Ok(station)) => (Some(station), None),
                    Some(Err(e)) => (None, Some(e)),
                    None => (None, None),
                };
                let table = source.canonicalize(station_id, raw)?;
                let tables = split_by_year(&table, &source.station_source_file(station_id))?;
                Ok(SourceRead {
                    tables,
                    metadata,
                    metadata_error,
                })
            }
        }
    }

    /// Raw files a read of `years` would open
    pub fn input_paths(&self, station_id: &str, years: &[i32]) -> Vec<PathBuf> {
        match self {
            SourceReader::Year(source) => years
                .iter()
                .map(|&year| source.year_source_file(station_id, year))
                .collect(),
            SourceReader::Station(source) => vec![source.station_source_file(station_id)],
        }
    }
}

/// Build the canonical `time` column from epoch milliseconds
pub(crate) fn time_series(millis: Vec<Option<i64>>) -> PolarsResult<Series> {
    Series::new(TIME_COLUMN.into(), millis).cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
}

/// Epoch milliseconds of the canonical `time` column
pub(crate) fn time_millis(table: &DataFrame) -> PolarsResult<Vec<Option<i64>>> {
    let as_int = table.column(TIME_COLUMN)?.cast(&DataType::Int64)?;
    Ok(as_int.as_materialized_series().i64()?.into_iter().collect())
}

/// Calendar year of each row of a canonical table
pub(crate) fn row_years(table: &DataFrame) -> PolarsResult<Vec<Option<i32>>> {
    Ok(time_millis(table)?
        .into_iter()
        .map(|ms| ms.and_then(DateTime::from_timestamp_millis).map(|dt| dt.year()))
        .collect())
}

/// Split a canonical table into one table per calendar year
pub(crate) fn split_by_year(table: &DataFrame, path: &Path) -> Result<BTreeMap<i32, DataFrame>> {
    let years = row_years(table)
        .map_err(|e| CurationError::parse(ParsePhase::YearFilter, path, e))?;

    let mut distinct: Vec<i32> = years.iter().flatten().copied().collect();
    distinct.sort_unstable();
    distinct.dedup();

    let mut tables = BTreeMap::new();
    for year in distinct {
        let mask: BooleanChunked = years.iter().map(|y| *y == Some(year)).collect();
        let subset = table
            .filter(&mask)
            .map_err(|e| CurationError::parse(ParsePhase::YearFilter, path, e))?;
        tables.insert(year, subset);
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn millis(y: i32, m: u32, d: u32, h: u32) -> i64 {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis()
    }

    #[test]
    fn test_split_by_year() {
        let time = time_series(vec![
            Some(millis(2019, 12, 31, 23)),
            Some(millis(2020, 1, 1, 0)),
            Some(millis(2020, 6, 1, 12)),
            None,
        ])
        .unwrap();
        let value = Series::new("precip".into(), [1.0, 2.0, 3.0, 4.0]);
        let table = DataFrame::new(vec![time.into(), value.into()]).unwrap();

        let tables = split_by_year(&table, Path::new("test.psv")).unwrap();
        assert_eq!(tables.keys().copied().collect::<Vec<_>>(), vec![2019, 2020]);
        assert_eq!(tables[&2019].height(), 1);
        assert_eq!(tables[&2020].height(), 2);
    }

    #[test]
    fn test_time_series_is_datetime() {
        let series = time_series(vec![Some(millis(2020, 1, 1, 0))]).unwrap();
        assert_eq!(
            series.dtype(),
            &DataType::Datetime(TimeUnit::Milliseconds, None)
        );
    }
}
