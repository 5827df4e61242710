//! End-to-end tests for both pipeline steps on a small GHCNh tree

use ghcnh_curator::layout::StoreLayout;
use ghcnh_curator::logbuffer::{LogLevel, LogSink};
use ghcnh_curator::reconcile::{InventoryStore, StationListStore};
use ghcnh_curator::store::{ColumnarStore, ParquetStore};
use ghcnh_curator::{CurationConfig, CurationError, CurationPipeline, Station, Step, VariableCatalog};
use polars::prelude::*;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const PSV_HEADER: &str = "Station_ID|Station_name|Year|Month|Day|Hour|Minute|Latitude|Longitude|Elevation|precip|precip_Measurement_Code|precip_Quality_Code|precip_Report_Type|precip_Source_Code|precip_Source_Station_ID";

fn config(root: &Path) -> CurationConfig {
    CurationConfig::new(root)
        .with_catalog(VariableCatalog::new(["precip"]))
        .with_workers(2)
        .without_progress()
}

fn layout(root: &Path) -> StoreLayout {
    StoreLayout::new(root.join("GHCNh"))
}

fn write_station_years(path: &Path, entries: &[(&str, i32)]) {
    let mut table = df!(
        "station_id" => entries.iter().map(|(s, _)| *s).collect::<Vec<_>>(),
        "year" => entries.iter().map(|(_, y)| *y).collect::<Vec<_>>(),
    )
    .unwrap();
    ParquetStore::default().write(path, &mut table).unwrap();
}

fn write_year_file(layout: &StoreLayout, station: &str, year: i32, rows: usize) {
    let dates: Vec<String> = (0..rows)
        .map(|hour| format!("{year}-03-{:02}T{:02}:00:00", 1 + hour / 24, hour % 24))
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

/// One 2019 row, `rows_2020` rows in 2020 and three 2021 rows at a new position
fn write_station_file(layout: &StoreLayout, station: &str, rows_2020: usize) {
    let mut lines = vec![PSV_HEADER.to_string()];
    lines.push(format!(
        "{station}|TEST STATION|2019|12|31|23|0|45.0|5.0|210.0|0.1|||||"
    ));
    for hour in 0..rows_2020 {
        lines.push(format!(
            "{station}|TEST STATION|2020|3|1|{hour}|0|45.0|5.0|210.0|0.5||1|||"
        ));
    }
    for hour in 0..3 {
        lines.push(format!(
            "{station}|RELOCATED STATION|2021|6|1|{hour}|0|46.0|6.0|300.0|1.5||1|||"
        ));
    }

    let path = layout.station_source_file(station);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, lines.join("\n") + "\n").unwrap();
}

/// AB0001 inventoried for 2020 and 2021; 2021 only exists in the by-station layout
fn seed_tree(root: &Path) -> StoreLayout {
    let layout = layout(root);
    write_station_years(
        &layout.station_year_inventory(),
        &[("AB0001", 2020), ("AB0001", 2021)],
    );
    write_station_years(&layout.missing_by_year(), &[("AB0001", 2021)]);
    write_year_file(&layout, "AB0001", 2020, 24);
    write_station_file(&layout, "AB0001", 20);
    layout
}

fn inventory_store(layout: &StoreLayout) -> InventoryStore {
    InventoryStore::new(layout.clone(), Arc::new(ParquetStore::default()))
}

#[derive(Clone, Default)]
struct CaptureSink(Arc<Mutex<Vec<(LogLevel, String)>>>);

impl LogSink for CaptureSink {
    fn emit(&self, level: LogLevel, message: &str) {
        self.0.lock().unwrap().push((level, message.to_string()));
    }
}

#[tokio::test]
async fn test_end_to_end_reconciliation() {
    let temp = TempDir::new().unwrap();
    let layout = seed_tree(temp.path());

    let step1 = ghcnh_curator::run(1, None, None, config(temp.path()))
        .await
        .unwrap();
    assert_eq!(step1.tasks_run, 1);
    assert_eq!(step1.tasks_failed, 0);
    assert_eq!(step1.partitions_written, 1);
    assert!(layout.partition_file("AB0001", 2020, "precip").exists());

    let step2 = ghcnh_curator::run(2, Some(1), None, config(temp.path()))
        .await
        .unwrap();
    assert_eq!(step2.tasks_failed, 0);
    assert_eq!(step2.conflicts.len(), 1);
    for fragment in ["AB0001", "precip", "2020", "24", "20"] {
        assert!(
            step2.conflicts[0].contains(fragment),
            "conflict '{}' lacks {fragment}",
            step2.conflicts[0]
        );
    }

    // Overlap years are tallied, never written by the by-station pass
    assert!(layout.partition_file("AB0001", 2021, "precip").exists());
    let partition_2020 = ParquetStore::default()
        .read(&layout.partition_file("AB0001", 2020, "precip"), None)
        .unwrap();
    assert_eq!(partition_2020.height(), 24);

    let inventory = inventory_store(&layout)
        .read_variable_inventory(&layout.variable_inventory("precip"))
        .unwrap();
    assert_eq!(inventory[&("AB0001".to_string(), 2020)], 24);
    assert_eq!(inventory[&("AB0001".to_string(), 2021)], 3);
    assert_eq!(inventory.len(), 2);

    let stations = StationListStore::new(layout.clone(), Arc::new(ParquetStore::default()))
        .read()
        .unwrap();
    assert_eq!(step2.stations_emitted, Some(1));
    assert_eq!(
        stations,
        vec![Station {
            station_id: "AB0001".to_string(),
            lat: 46.0,
            lon: 6.0,
            elevation: Some(300.0),
            name: "RELOCATED STATION".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_step_one_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let layout = seed_tree(temp.path());
    let variables = vec!["precip".to_string()];

    let first = ghcnh_curator::run(1, None, None, config(temp.path()))
        .await
        .unwrap();
    let partitions_after_first = layout.list_partitions(&variables);
    let inventory_after_first = inventory_store(&layout)
        .read_variable_inventory(&layout.variable_inventory("precip"))
        .unwrap();

    let second = ghcnh_curator::run(1, None, None, config(temp.path()))
        .await
        .unwrap();

    assert_eq!(first.partitions_written, second.partitions_written);
    assert_eq!(first.inventory_entries, second.inventory_entries);
    assert_eq!(layout.list_partitions(&variables), partitions_after_first);
    assert_eq!(
        inventory_store(&layout)
            .read_variable_inventory(&layout.variable_inventory("precip"))
            .unwrap(),
        inventory_after_first
    );
    assert_eq!(
        inventory_store(&layout).read_snapshot().unwrap().len(),
        first.inventory_entries
    );
}

#[tokio::test]
async fn test_station_list_scoped_to_this_run() {
    let temp = TempDir::new().unwrap();
    let layout = seed_tree(temp.path());
    StationListStore::new(layout.clone(), Arc::new(ParquetStore::default()))
        .write(&[Station {
            station_id: "OLD0001".to_string(),
            lat: 10.0,
            lon: 10.0,
            elevation: None,
            name: "DECOMMISSIONED".to_string(),
        }])
        .unwrap();

    ghcnh_curator::run(1, None, None, config(temp.path()))
        .await
        .unwrap();
    let report = ghcnh_curator::run(2, None, None, config(temp.path()))
        .await
        .unwrap();

    let stations = StationListStore::new(layout, Arc::new(ParquetStore::default()))
        .read()
        .unwrap();
    assert_eq!(report.stations_emitted, Some(1));
    assert_eq!(stations.len(), 1);
    assert_eq!(stations[0].station_id, "AB0001");
    assert_eq!(stations[0].name, "RELOCATED STATION");
}

#[tokio::test]
async fn test_logs_replayed_in_station_order() {
    let temp = TempDir::new().unwrap();
    let layout = layout(temp.path());
    write_station_years(
        &layout.station_year_inventory(),
        &[("CC0003", 2020), ("AA0001", 2020), ("BB0002", 2020)],
    );
    write_station_years(&layout.missing_by_year(), &[]);
    for station in ["CC0003", "AA0001", "BB0002"] {
        write_year_file(&layout, station, 2020, 2);
    }

    let sink = CaptureSink::default();
    CurationPipeline::new(config(temp.path()).with_workers(3))
        .unwrap()
        .with_log_sink(Box::new(sink.clone()))
        .run_step(Step::YearSource)
        .await
        .unwrap();

    let lines = sink.0.lock().unwrap();
    let owners: Vec<&str> = lines
        .iter()
        .map(|(_, message)| &message[1..7])
        .collect();
    let mut sorted = owners.clone();
    sorted.sort();
    assert_eq!(owners, sorted);
    assert!(owners.contains(&"AA0001") && owners.contains(&"CC0003"));
}

#[tokio::test]
async fn test_fatal_errors_before_scheduling() {
    let temp = TempDir::new().unwrap();

    let invalid = ghcnh_curator::run(3, None, None, config(temp.path()))
        .await
        .unwrap_err();
    assert!(matches!(invalid, CurationError::InvalidStep { step: 3 }));

    let unreadable = ghcnh_curator::run(1, None, None, config(temp.path()))
        .await
        .unwrap_err();
    assert!(matches!(unreadable, CurationError::UnreadableArtifact { .. }));
    assert!(!layout(temp.path()).data_dir().exists());
}
