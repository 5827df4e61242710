//! Fixtures shared by the orchestrator tests

use crate::layout::StoreLayout;
use crate::partitioner::VariablePartitioner;
use crate::schema::VariableCatalog;
use crate::source::{SourceReader, StationSource, YearSource};
use crate::store::{ColumnarStore, ParquetStore};
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

const PSV_HEADER: &str = "Station_ID|Station_name|Year|Month|Day|Hour|Minute|Latitude|Longitude|Elevation|precip|precip_Measurement_Code|precip_Quality_Code|precip_Report_Type|precip_Source_Code|precip_Source_Station_ID";


pub fn station_years(entries: &[(&str, &[i32])]) -> BTreeMap<String, BTreeSet<i32>> {
    entries
        .iter()
        .map(|(station, years)| (station.to_string(), years.iter().copied().collect()))
        .collect()
}

pub fn catalog() -> Arc<VariableCatalog> {
    Arc::new(VariableCatalog::new(["precip"]))
}

pub fn year_reader(layout: &StoreLayout) -> SourceReader {
    SourceReader::Year(YearSource::new(
        layout.clone(),
        Arc::new(ParquetStore::default()),
    ))
}

pub fn station_reader(layout: &StoreLayout) -> SourceReader {
    SourceReader::Station(StationSource::new(layout.clone(), catalog()))
}

pub fn partitioner(layout: &StoreLayout) -> Arc<VariablePartitioner> {
    Arc::new(VariablePartitioner::new(
        catalog(),
        layout.clone(),
        Arc::new(ParquetStore::default()),
    ))
}

/// By-year file with `rows` hourly precip observations on 1 January
pub fn write_year_file(layout: &StoreLayout, station: &str, year: i32, rows: usize) {
    let dates: Vec<String> = (0..rows)
        .map(|hour| format!("{year}-01-{:02}T{:02}:00:00", 1 + hour / 24, hour % 24))
        .collect();
    let mut table = df!(
        "Station_ID" => vec![station; rows],
        "Station_name" => vec!["TEST STATION"; rows],
        "DATE" => dates,
        "Latitude" => vec![45.0; rows],
        "Longitude" => vec![5.0; rows],
        "Elevation" => vec![210.0; rows],
        "precip" => vec![0.5; rows],
        "precip_Quality_Code" => vec!["1"; rows],
    )
    .unwrap();
    ParquetStore::default()
        .write(&layout.year_source_file(station, year), &mut table)
        .unwrap();
}

/// By-station file holding `rows` under the precip-only header
pub fn write_station_file(layout: &StoreLayout, station: &str, rows: &[&str]) {
    let mut lines = vec![PSV_HEADER];
    lines.extend_from_slice(rows);
    let path = layout.station_source_file(station);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, lines.join("\n") + "\n").unwrap();
}
