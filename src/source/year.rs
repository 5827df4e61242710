//! By-year source: one Parquet file per station-year.

use super::time_series;
use crate::constants::{COL_DATE, DATE_FORMATS, STATION_IDENTITY_COLUMNS, TIME_COLUMN};
use crate::error::{CurationError, ParsePhase, Result};
use crate::layout::StoreLayout;
use crate::store::ColumnarStore;
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct YearSource {
    layout: StoreLayout,
    store: Arc<dyn ColumnarStore>,
}

impl YearSource {
    pub fn new(layout: StoreLayout, store: Arc<dyn ColumnarStore>) -> Self {
        Self { layout, store }
    }

    pub fn year_source_file(&self, station_id: &str, year: i32) -> PathBuf {
        self.layout.year_source_file(station_id, year)
    }

    /// Parse one station-year file into a canonical table
    pub fn read(&self, station_id: &str, year: i32) -> Result<DataFrame> {
        let path = self.year_source_file(station_id, year);

        let raw = match self.store.read(&path, None) {
            Ok(raw) => raw,
            Err(e @ CurationError::MissingInput { .. }) => return Err(e),
            Err(e) => return Err(CurationError::parse(ParsePhase::Read, &path, e)),
        };

        let time = parse_date_column(&raw, &path)?;

        let mut table = STATION_IDENTITY_COLUMNS
            .iter()
            .chain(std::iter::once(&COL_DATE))
            .try_fold(raw, |table, column| table.drop(column))
            .map_err(|e| CurationError::parse(ParsePhase::ColumnPruning, &path, e))?;

        table
            .insert_column(0, time)
            .map_err(|e| CurationError::parse(ParsePhase::ColumnPruning, &path, e))?;

        debug!(
            "Read {} rows for {} in {} from {}",
            table.height(),
            station_id,
            year,
            path.display()
        );
        Ok(table)
    }
}

/// Derive the canonical `time` column from the DATE field
fn parse_date_column(raw: &DataFrame, path: &Path) -> Result<Series> {
    let timestamp_error = |reason: String| {
        CurationError::parse(ParsePhase::TimestampConstruction, path, reason)
    };

    let date = raw
        .column(COL_DATE)
        .map_err(|e| timestamp_error(e.to_string()))?;

    match date.dtype() {
        DataType::String => {
            let strings = date
                .as_materialized_series()
                .str()
                .map_err(|e| timestamp_error(e.to_string()))?;

            let mut millis = Vec::with_capacity(strings.len());
            for value in strings.into_iter() {
                match value {
                    Some(text) => {
                        let parsed = parse_date_string(text)
                            .ok_or_else(|| timestamp_error(format!("unparseable DATE '{text}'")))?;
                        millis.push(Some(parsed.and_utc().timestamp_millis()));
                    }
                    None => millis.push(None),
                }
            }
            time_series(millis).map_err(|e| timestamp_error(e.to_string()))
        }
        dtype if dtype.is_temporal() => date
            .as_materialized_series()
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .map(|series| series.with_name(TIME_COLUMN.into()))
            .map_err(|e| timestamp_error(e.to_string())),
        other => Err(timestamp_error(format!("unsupported DATE type {other}"))),
    }
}

/// Try each accepted DATE format in turn, then a bare date
pub(crate) fn parse_date_string(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}
