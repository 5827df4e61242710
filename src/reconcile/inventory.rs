//! Record-count inventory: merge of both sources and per-variable persistence.

use crate::constants::{
    INVENTORY_COUNT_COLUMN, INVENTORY_STATION_COLUMN, INVENTORY_VARIABLE_COLUMN,
    INVENTORY_YEAR_COLUMN,
};
use crate::error::{CurationError, Result};
use crate::layout::StoreLayout;
use crate::models::{PartialInventory, TaskResult};
use crate::orchestrator::StationYears;
use crate::store::ColumnarStore;
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InventoryKey {
    pub station_id: String,
    pub variable: String,
    pub year: i32,
}

impl fmt::Display for InventoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "station {} variable {} year {}",
            self.station_id, self.variable, self.year
        )
    }
}

/// Disagreement between the two sources for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryConflict {
    pub key: InventoryKey,
    pub year_source_count: usize,
    pub station_source_count: usize,
}

impl fmt::Display for InventoryConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "count conflict for {}: by-year {} vs by-station {}, keeping {}",
            self.key, self.year_source_count, self.station_source_count, self.year_source_count
        )
    }
}

/// Flat (station, variable, year) -> count map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    entries: BTreeMap<InventoryKey, usize>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold the partial inventories of successful tasks
    pub fn from_results(results: &[TaskResult]) -> Self {
        let mut inventory = Self::new();
        for result in results {
            inventory.absorb(&result.station_id, &result.partial_inventory);
        }
        inventory
    }

    /// Fold the tallied (unwritten) counts of every task
    pub fn overlap_from_results(results: &[TaskResult]) -> Self {
        let mut inventory = Self::new();
        for result in results {
            inventory.absorb(&result.station_id, &result.overlap_inventory);
        }
        inventory
    }

    /// Add one station's partial inventory; zero counts are ignored
    pub fn absorb(&mut self, station_id: &str, partial: &PartialInventory) {
        for (variable, years) in partial {
            for (&year, &count) in years {
                if count > 0 {
                    self.insert(station_id, variable, year, count);
                }
            }
        }
    }

    pub fn insert(&mut self, station_id: &str, variable: &str, year: i32, count: usize) {
        self.entries.insert(
            InventoryKey {
                station_id: station_id.to_string(),
                variable: variable.to_string(),
                year,
            },
            count,
        );
    }

    pub fn get(&self, station_id: &str, variable: &str, year: i32) -> Option<usize> {
        self.entries
            .get(&InventoryKey {
                station_id: station_id.to_string(),
                variable: variable.to_string(),
                year,
            })
            .copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InventoryKey, usize)> {
        self.entries.iter().map(|(key, &count)| (key, count))
    }

    /// Entries whose key also appears in `other`
    pub fn restricted_to(&self, other: &Inventory) -> Inventory {
        Inventory {
            entries: self
                .entries
                .iter()
                .filter(|(key, _)| other.entries.contains_key(*key))
                .map(|(key, &count)| (key.clone(), count))
                .collect(),
        }
    }

    /// Overlay `other` onto a copy of self; `other` wins on shared keys
    pub fn union(&self, other: &Inventory) -> Inventory {
        let mut entries = self.entries.clone();
        entries.extend(other.entries.iter().map(|(k, &v)| (k.clone(), v)));
        Inventory { entries }
    }

    /// variable -> (station, year) -> count
    pub fn by_variable(&self) -> BTreeMap<String, BTreeMap<(String, i32), usize>> {
        let mut grouped: BTreeMap<String, BTreeMap<(String, i32), usize>> = BTreeMap::new();
        for (key, &count) in &self.entries {
            grouped
                .entry(key.variable.clone())
                .or_default()
                .insert((key.station_id.clone(), key.year), count);
        }
        grouped
    }
}

/// Merge both sources' inventories; the by-year count wins every conflict
pub fn merge(
    year_inventory: &Inventory,
    station_inventory: &Inventory,
) -> (Inventory, Vec<InventoryConflict>) {
    let mut conflicts = Vec::new();
    let mut merged = year_inventory.clone();

    for (key, &station_count) in &station_inventory.entries {
        match year_inventory.entries.get(key) {
            Some(&year_count) if year_count != station_count => {
                let conflict = InventoryConflict {
                    key: key.clone(),
                    year_source_count: year_count,
                    station_source_count: station_count,
                };
                warn!("{}", conflict);
                conflicts.push(conflict);
            }
            Some(_) => {}
            None => {
                merged.entries.insert(key.clone(), station_count);
            }
        }
    }

    (merged, conflicts)
}

/// Reader/writer for every inventory artifact under `metadata/`
#[derive(Debug, Clone)]
pub struct InventoryStore {
    layout: StoreLayout,
    store: Arc<dyn ColumnarStore>,
}

impl InventoryStore {
    pub fn new(layout: StoreLayout, store: Arc<dyn ColumnarStore>) -> Self {
        Self { layout, store }
    }

    /// The station x year inventory; unreadable is fatal
    pub fn read_station_year_inventory(&self) -> Result<StationYears> {
        read_station_years(self.store.as_ref(), &self.layout.station_year_inventory())
    }

    /// The missing-by-year exception list; unreadable is fatal
    pub fn read_missing_by_year(&self) -> Result<StationYears> {
        read_station_years(self.store.as_ref(), &self.layout.missing_by_year())
    }

    /// Persist the by-year pass inventory for the by-station pass
    pub fn write_snapshot(&self, inventory: &Inventory) -> Result<()> {
        let mut stations = Vec::with_capacity(inventory.len());
        let mut variables = Vec::with_capacity(inventory.len());
        let mut years = Vec::with_capacity(inventory.len());
        let mut counts = Vec::with_capacity(inventory.len());
        for (key, count) in inventory.iter() {
            stations.push(key.station_id.clone());
            variables.push(key.variable.clone());
            years.push(key.year);
            counts.push(count as u64);
        }

        let mut table = DataFrame::new(vec![
            Column::new(INVENTORY_STATION_COLUMN.into(), stations),
            Column::new(INVENTORY_VARIABLE_COLUMN.into(), variables),
            Column::new(INVENTORY_YEAR_COLUMN.into(), years),
            Column::new(INVENTORY_COUNT_COLUMN.into(), counts),
        ])?;
        self.store
            .write(&self.layout.year_source_snapshot(), &mut table)
    }

    /// Snapshot left by the by-year pass; empty when it never ran
    pub fn read_snapshot(&self) -> Result<Inventory> {
        let path = self.layout.year_source_snapshot();
        let table = match self.store.read(&path, None) {
            Ok(table) => table,
            Err(CurationError::MissingInput { .. }) => {
                warn!(
                    "No by-year inventory snapshot at {}; reconciling against an empty inventory",
                    path.display()
                );
                return Ok(Inventory::new());
            }
            Err(e) => return Err(e),
        };

        let stations = string_values(&table, INVENTORY_STATION_COLUMN)?;
        let variables = string_values(&table, INVENTORY_VARIABLE_COLUMN)?;
        let years = int_values(&table, INVENTORY_YEAR_COLUMN)?;
        let counts = int_values(&table, INVENTORY_COUNT_COLUMN)?;

        let mut inventory = Inventory::new();
        for row in 0..table.height() {
            if let (Some(station), Some(variable), Some(year), Some(count)) = (
                &stations[row],
                &variables[row],
                years[row],
                counts[row],
            ) {
                inventory.insert(station, variable, year as i32, count.max(0) as usize);
            }
        }
        Ok(inventory)
    }

    /// Update each per-variable inventory by key; returns the files written
    ///
    /// Existing keys not supplied this run are kept as they were.
    pub fn update_variable_inventories(&self, inventory: &Inventory) -> Result<usize> {
        let mut written = 0;
        for (variable, supplied) in inventory.by_variable() {
            let path = self.layout.variable_inventory(&variable);
            let mut entries = self.read_variable_inventory(&path)?;
            let previous = entries.len();
            entries.extend(supplied);

            let mut stations = Vec::with_capacity(entries.len());
            let mut years = Vec::with_capacity(entries.len());
            let mut counts = Vec::with_capacity(entries.len());
            for ((station, year), count) in &entries {
                stations.push(station.clone());
                years.push(*year);
                counts.push(*count as u64);
            }

            let mut table = DataFrame::new(vec![
                Column::new(INVENTORY_STATION_COLUMN.into(), stations),
                Column::new(INVENTORY_YEAR_COLUMN.into(), years),
                Column::new(INVENTORY_COUNT_COLUMN.into(), counts),
            ])?;
            self.store.write(&path, &mut table)?;
            debug!(
                "Inventory for {}: {} entries ({} previously)",
                variable,
                entries.len(),
                previous
            );
            written += 1;
        }
        Ok(written)
    }

    /// (station, year) -> count of one per-variable inventory; empty if absent
    pub fn read_variable_inventory(&self, path: &Path) -> Result<BTreeMap<(String, i32), usize>> {
        let table = match self.store.read(path, None) {
            Ok(table) => table,
            Err(CurationError::MissingInput { .. }) => return Ok(BTreeMap::new()),
            Err(e) => return Err(e),
        };

        let stations = string_values(&table, INVENTORY_STATION_COLUMN)?;
        let years = int_values(&table, INVENTORY_YEAR_COLUMN)?;
        let counts = int_values(&table, INVENTORY_COUNT_COLUMN)?;

        Ok(stations
            .into_iter()
            .zip(years)
            .zip(counts)
            .filter_map(|((station, year), count)| {
                Some(((station?, year? as i32), count?.max(0) as usize))
            })
            .collect())
    }
}

/// station -> years from a two-column (station_id, year) artifact
fn read_station_years(store: &dyn ColumnarStore, path: &Path) -> Result<StationYears> {
    let unreadable = |reason: String| CurationError::UnreadableArtifact {
        path: path.to_path_buf(),
        reason,
    };

    let table = store
        .read(path, Some(&[INVENTORY_STATION_COLUMN, INVENTORY_YEAR_COLUMN]))
        .map_err(|e| unreadable(e.to_string()))?;
    let stations =
        string_values(&table, INVENTORY_STATION_COLUMN).map_err(|e| unreadable(e.to_string()))?;
    let years =
        int_values(&table, INVENTORY_YEAR_COLUMN).map_err(|e| unreadable(e.to_string()))?;

    let mut station_years = StationYears::new();
    for (station, year) in stations.into_iter().zip(years) {
        if let (Some(station), Some(year)) = (station, year) {
            station_years
                .entry(station)
                .or_default()
                .insert(year as i32);
        }
    }
    Ok(station_years)
}

fn string_values(table: &DataFrame, column: &str) -> PolarsResult<Vec<Option<String>>> {
    let cast = table.column(column)?.cast(&DataType::String)?;
    Ok(cast
        .as_materialized_series()
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

fn int_values(table: &DataFrame, column: &str) -> PolarsResult<Vec<Option<i64>>> {
    let cast = table.column(column)?.cast(&DataType::Int64)?;
    Ok(cast.as_materialized_series().i64()?.into_iter().collect())
}
