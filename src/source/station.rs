//! By-station source: one pipe-separated file per station, full period of record.
//!
//! Every column is first read as text so that sparse code columns (present
//! weather, sky cover) cannot be mis-inferred from their first rows, then cast
//! to the type the catalog assigns.

use super::time_series;
use crate::constants::{
    COL_DAY, COL_ELEVATION, COL_HOUR, COL_LATITUDE, COL_LONGITUDE, COL_MINUTE, COL_MONTH,
    COL_STATION_ID, COL_STATION_NAME, COL_YEAR, DATE_PART_COLUMNS, MISSING_ELEVATION,
    STATION_IDENTITY_COLUMNS,
};
use crate::error::{CurationError, ParsePhase, Result};
use crate::layout::StoreLayout;
use crate::models::Station;
use crate::schema::VariableCatalog;
use chrono::NaiveDate;
use polars::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct StationSource {
    layout: StoreLayout,
    catalog: Arc<VariableCatalog>,
}

impl StationSource {
    pub fn new(layout: StoreLayout, catalog: Arc<VariableCatalog>) -> Self {
        Self { layout, catalog }
    }

    pub fn station_source_file(&self, station_id: &str) -> PathBuf {
        self.layout.station_source_file(station_id)
    }

    /// Parse one multi-year file restricted to `years` into a canonical table
    pub fn read(&self, station_id: &str, years: &[i32]) -> Result<DataFrame> {
        let raw = self.load(station_id, years)?;
        self.canonicalize(station_id, raw)
    }

    /// Read, coerce and year-filter the raw file, keeping identity columns
    pub fn load(&self, station_id: &str, years: &[i32]) -> Result<DataFrame> {
        let path = self.station_source_file(station_id);
        if !path.is_file() {
            return Err(CurationError::MissingInput { path });
        }

        let raw = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .map_parse_options(|options| options.with_separator(b'|'))
            .try_into_reader_with_file_path(Some(path.clone()))
            .and_then(|reader| reader.finish())
            .map_err(|e| CurationError::parse(ParsePhase::Read, &path, e))?;

        let coerced = self
            .coerce_types(raw)
            .map_err(|e| CurationError::parse(ParsePhase::TypeCoercion, &path, e))?;

        let filtered = filter_years(&coerced, years)
            .map_err(|e| CurationError::parse(ParsePhase::YearFilter, &path, e))?;

        debug!(
            "Loaded {} of {} rows for {} ({} requested years) from {}",
            filtered.height(),
            coerced.height(),
            station_id,
            years.len(),
            path.display()
        );
        Ok(filtered)
    }

    /// Cast every text column to the type its family requires
    fn coerce_types(&self, mut raw: DataFrame) -> PolarsResult<DataFrame> {
        let names: Vec<String> = raw
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();

        for name in names {
            let target = self.catalog.column_kind(&name).target_type();
            let column = raw.column(&name)?;
            if column.dtype() != &target {
                let cast = column.cast(&target)?;
                raw.with_column(cast)?;
            }
        }
        Ok(raw)
    }

    /// Station metadata from the first row of `preferred_years`, else the first row
    pub fn capture_metadata(
        &self,
        station_id: &str,
        raw: &DataFrame,
        preferred_years: &[i32],
    ) -> Result<Station> {
        let path = self.station_source_file(station_id);
        let capture_error =
            |reason: String| CurationError::parse(ParsePhase::MetadataCapture, &path, reason);

        if raw.height() == 0 {
            return Err(capture_error("no rows in requested years".to_string()));
        }

        let row = first_row_in_years(raw, preferred_years)
            .map_err(|e| capture_error(e.to_string()))?
            .unwrap_or(0);

        let text_at = |column: &str| -> PolarsResult<Option<String>> {
            Ok(raw
                .column(column)?
                .as_materialized_series()
                .str()?
                .get(row)
                .map(|s| s.trim().to_string()))
        };
        let float_at = |column: &str| -> PolarsResult<Option<f64>> {
            raw.column(column)?
                .as_materialized_series()
                .f64()
                .map(|values| values.get(row))
        };

        let extracted = (|| -> PolarsResult<_> {
            Ok((
                text_at(COL_STATION_ID)?,
                float_at(COL_LATITUDE)?,
                float_at(COL_LONGITUDE)?,
                float_at(COL_ELEVATION)?,
                text_at(COL_STATION_NAME)?,
            ))
        })()
        .map_err(|e| capture_error(e.to_string()))?;

        let (id, lat, lon, elevation, name) = extracted;
        let lat = lat.ok_or_else(|| capture_error("latitude is empty".to_string()))?;
        let lon = lon.ok_or_else(|| capture_error("longitude is empty".to_string()))?;

        Ok(Station {
            station_id: id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| station_id.to_string()),
            lat,
            lon,
            elevation: elevation.filter(|e| (e - MISSING_ELEVATION).abs() > f64::EPSILON),
            name: name.unwrap_or_default(),
        })
    }

    /// Compose `time` from the date parts and drop identity and date columns
    pub fn canonicalize(&self, station_id: &str, raw: DataFrame) -> Result<DataFrame> {
        let path = self.station_source_file(station_id);

        let time = compose_timestamps(&raw)
            .map_err(|reason| CurationError::parse(ParsePhase::TimestampConstruction, &path, reason))?;

        let mut table = STATION_IDENTITY_COLUMNS
            .iter()
            .chain(DATE_PART_COLUMNS.iter())
            .try_fold(raw, |table, column| table.drop(column))
            .map_err(|e| CurationError::parse(ParsePhase::ColumnPruning, &path, e))?;

        table
            .insert_column(0, time)
            .map_err(|e| CurationError::parse(ParsePhase::ColumnPruning, &path, e))?;
        Ok(table)
    }
}

/// Keep rows whose Year is one of `years`
fn filter_years(raw: &DataFrame, years: &[i32]) -> PolarsResult<DataFrame> {
    let year_values = raw.column(COL_YEAR)?.as_materialized_series().i32()?.clone();
    let mask: BooleanChunked = year_values
        .into_iter()
        .map(|year| year.is_some_and(|y| years.contains(&y)))
        .collect();
    raw.filter(&mask)
}

/// Index of the first row whose Year is in `years`
fn first_row_in_years(raw: &DataFrame, years: &[i32]) -> PolarsResult<Option<usize>> {
    let year_values = raw.column(COL_YEAR)?.as_materialized_series().i32()?.clone();
    Ok(year_values
        .into_iter()
        .position(|year| year.is_some_and(|y| years.contains(&y))))
}

/// Epoch-millisecond timestamps from Year/Month/Day/Hour/Minute
fn compose_timestamps(raw: &DataFrame) -> std::result::Result<Series, String> {
    let part = |name: &str| -> std::result::Result<Vec<Option<i32>>, String> {
        Ok(raw
            .column(name)
            .map_err(|e| e.to_string())?
            .as_materialized_series()
            .i32()
            .map_err(|e| e.to_string())?
            .into_iter()
            .collect())
    };

    let years = part(COL_YEAR)?;
    let months = part(COL_MONTH)?;
    let days = part(COL_DAY)?;
    let hours = part(COL_HOUR)?;
    let minutes = part(COL_MINUTE)?;

    let mut millis = Vec::with_capacity(years.len());
    for row in 0..years.len() {
        let (Some(y), Some(mo), Some(d)) = (years[row], months[row], days[row]) else {
            return Err(format!("row {row}: incomplete date"));
        };
        let h = hours[row].unwrap_or(0);
        let mi = minutes[row].unwrap_or(0);

        let timestamp = u32::try_from(mo)
            .ok()
            .zip(u32::try_from(d).ok())
            .and_then(|(mo, d)| NaiveDate::from_ymd_opt(y, mo, d))
            .zip(u32::try_from(h).ok().zip(u32::try_from(mi).ok()))
            .and_then(|(date, (h, mi))| date.and_hms_opt(h, mi, 0))
            .ok_or_else(|| format!("row {row}: invalid date {y}-{mo}-{d} {h}:{mi}"))?;

        millis.push(Some(timestamp.and_utc().timestamp_millis()));
    }

    time_series(millis).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HEADER: &str = "Station_ID|Station_name|Year|Month|Day|Hour|Minute|Latitude|Longitude|Elevation|precip|precip_Measurement_Code|precip_Quality_Code|precip_Report_Type|precip_Source_Code|precip_Source_Station_ID|pres_wx_MW1|pres_wx_MW1_Measurement_Code|pres_wx_MW1_Quality_Code|pres_wx_MW1_Report_Type|pres_wx_MW1_Source_Code|pres_wx_MW1_Source_Station_ID";

    fn catalog() -> Arc<VariableCatalog> {
        Arc::new(VariableCatalog::new(["precip", "pres_wx_MW1"]))
    }

    fn write_psv(layout: &StoreLayout, station: &str, rows: &[&str]) {
        let path = layout.station_source_file(station);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut content = String::from(HEADER);
        for row in rows {
            content.push('\n');
            content.push_str(row);
        }
        content.push('\n');
        std::fs::write(path, content).unwrap();
    }

    fn sample_rows() -> Vec<&'static str> {
        vec![
            "AB0001|TEST STATION|2019|12|31|23|0|45.0|5.0|-999.9|0.1|||||||||||",
            "AB0001|TEST STATION|2020|1|1|0|30|45.0|5.0|-999.9|0.2|M|1|FM-15|4||01|||||",
            "AB0001|TEST STATION|2021|6|1|12|0|45.5|5.5|210.0||||||||||||",
        ]
    }

    #[test]
    fn test_read_restricts_years_and_builds_time() {
        let temp = TempDir::new().unwrap();
        let layout = StoreLayout::new(temp.path());
        write_psv(&layout, "AB0001", &sample_rows());

        let source = StationSource::new(layout, catalog());
        let table = source.read("AB0001", &[2020, 2021]).unwrap();

        assert_eq!(table.height(), 2);
        let names: Vec<String> = table
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names[0], "time");
        assert!(!names.iter().any(|n| n == "Station_ID" || n == "Year"));
    }

    #[test]
    fn test_ambiguous_columns_are_text_and_values_float() {
        let temp = TempDir::new().unwrap();
        let layout = StoreLayout::new(temp.path());
        write_psv(&layout, "AB0001", &sample_rows());

        let source = StationSource::new(layout, catalog());
        let table = source.read("AB0001", &[2019, 2020, 2021]).unwrap();

        assert_eq!(table.column("precip").unwrap().dtype(), &DataType::Float64);
        assert_eq!(
            table.column("pres_wx_MW1").unwrap().dtype(),
            &DataType::String
        );
        assert_eq!(
            table.column("precip_Quality_Code").unwrap().dtype(),
            &DataType::String
        );
    }

    #[test]
    fn test_capture_metadata_prefers_requested_years() {
        let temp = TempDir::new().unwrap();
        let layout = StoreLayout::new(temp.path());
        write_psv(&layout, "AB0001", &sample_rows());

        let source = StationSource::new(layout, catalog());
        let raw = source.load("AB0001", &[2020, 2021]).unwrap();

        let from_2021 = source.capture_metadata("AB0001", &raw, &[2021]).unwrap();
        assert_eq!(from_2021.station_id, "AB0001");
        assert_eq!(from_2021.lat, 45.5);
        assert_eq!(from_2021.lon, 5.5);
        assert_eq!(from_2021.elevation, Some(210.0));
        assert_eq!(from_2021.name, "TEST STATION");

        let fallback = source.capture_metadata("AB0001", &raw, &[1990]).unwrap();
        assert_eq!(fallback.lat, 45.0);
        assert_eq!(fallback.elevation, None);
    }

    #[test]
    fn test_missing_file_is_missing_input() {
        let temp = TempDir::new().unwrap();
        let source = StationSource::new(StoreLayout::new(temp.path()), catalog());
        assert!(matches!(
            source.read("ZZ9999", &[2020]).unwrap_err(),
            CurationError::MissingInput { .. }
        ));
    }

    #[test]
    fn test_invalid_date_is_tagged_timestamp_failure() {
        let temp = TempDir::new().unwrap();
        let layout = StoreLayout::new(temp.path());
        write_psv(
            &layout,
            "AB0001",
            &["AB0001|TEST STATION|2020|13|1|0|0|45.0|5.0|10.0|0.1|||||||||||"],
        );

        let source = StationSource::new(layout, catalog());
        match source.read("AB0001", &[2020]).unwrap_err() {
            CurationError::ParseFailure { phase, .. } => {
                assert_eq!(phase, ParsePhase::TimestampConstruction)
            }
            other => panic!("Expected ParseFailure, got {other:?}"),
        }
    }
}
