//! Station list maintenance.

use crate::constants::{MISSING_ELEVATION, STATION_LIST_COLUMNS};
use crate::error::{CurationError, Result};
use crate::layout::StoreLayout;
use crate::models::Station;
use crate::store::ColumnarStore;
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Merge captured metadata into the persisted list, restricted to `scope`
///
/// Captured values replace persisted ones; stations outside the scope are
/// dropped. Output is ordered by station id.
pub fn reconcile_stations(
    existing: Vec<Station>,
    captured: Vec<Station>,
    scope: &BTreeSet<String>,
) -> Vec<Station> {
    let mut stations: BTreeMap<String, Station> = existing
        .into_iter()
        .map(|station| (station.station_id.clone(), station))
        .collect();
    for station in captured {
        stations.insert(station.station_id.clone(), station);
    }

    let before = stations.len();
    stations.retain(|station_id, _| scope.contains(station_id));
    debug!(
        "Station list: {} in scope, {} dropped",
        stations.len(),
        before - stations.len()
    );
    stations.into_values().collect()
}

#[derive(Debug, Clone)]
pub struct StationListStore {
    layout: StoreLayout,
    store: Arc<dyn ColumnarStore>,
}

impl StationListStore {
    pub fn new(layout: StoreLayout, store: Arc<dyn ColumnarStore>) -> Self {
        Self { layout, store }
    }

    /// Persisted station list; empty when none exists yet
    pub fn read(&self) -> Result<Vec<Station>> {
        let path = self.layout.station_list();
        let table = match self.store.read(&path, None) {
            Ok(table) => table,
            Err(CurationError::MissingInput { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let [id_col, lat_col, lon_col, elev_col, name_col] = STATION_LIST_COLUMNS;
        let text = |name: &str| -> PolarsResult<Vec<Option<String>>> {
            Ok(table
                .column(name)?
                .cast(&DataType::String)?
                .as_materialized_series()
                .str()?
                .into_iter()
                .map(|v| v.map(str::to_string))
                .collect())
        };
        let float = |name: &str| -> PolarsResult<Vec<Option<f64>>> {
            Ok(table
                .column(name)?
                .cast(&DataType::Float64)?
                .as_materialized_series()
                .f64()?
                .into_iter()
                .collect())
        };

        let ids = text(id_col)?;
        let lats = float(lat_col)?;
        let lons = float(lon_col)?;
        let elevations = float(elev_col)?;
        let names = text(name_col)?;

        let mut stations = Vec::with_capacity(ids.len());
        for row in 0..ids.len() {
            let (Some(station_id), Some(lat), Some(lon)) = (ids[row].clone(), lats[row], lons[row])
            else {
                warn!(
                    "Skipping station list row {} ({}): missing id or coordinates",
                    row,
                    ids[row].as_deref().unwrap_or("<no id>")
                );
                continue;
            };
            stations.push(Station {
                station_id,
                lat,
                lon,
                elevation: elevations[row].filter(|e| (e - MISSING_ELEVATION).abs() > f64::EPSILON),
                name: names[row].clone().unwrap_or_default(),
            });
        }
        Ok(stations)
    }

    pub fn write(&self, stations: &[Station]) -> Result<()> {
        let [id_col, lat_col, lon_col, elev_col, name_col] = STATION_LIST_COLUMNS;
        let mut table = DataFrame::new(vec![
            Column::new(
                id_col.into(),
                stations.iter().map(|s| s.station_id.clone()).collect::<Vec<_>>(),
            ),
            Column::new(lat_col.into(), stations.iter().map(|s| s.lat).collect::<Vec<_>>()),
            Column::new(lon_col.into(), stations.iter().map(|s| s.lon).collect::<Vec<_>>()),
            Column::new(
                elev_col.into(),
                stations.iter().map(|s| s.elevation).collect::<Vec<_>>(),
            ),
            Column::new(
                name_col.into(),
                stations.iter().map(|s| s.name.clone()).collect::<Vec<_>>(),
            ),
        ])?;
        self.store.write(&self.layout.station_list(), &mut table)
    }
}
