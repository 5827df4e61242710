//! Task planning for both source passes.
//!
//! The station x year inventory lists every station-year the archive knows
//! about. The missing-by-year list names the station-years absent from the
//! by-year layout; those are exactly what the by-station pass must export.

use crate::models::SourceKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// station -> years
pub type StationYears = BTreeMap<String, BTreeSet<i32>>;

/// One per-station unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurationTask {
    pub station_id: String,
    pub source: SourceKind,
    /// Years read, partitioned and folded into the inventory
    pub export_years: Vec<i32>,
    /// Years read and counted only; owned by the other source
    pub tally_years: Vec<i32>,
    /// Capture station metadata from the first exported row
    pub needs_metadata: bool,
}

impl CurationTask {
    /// Every year the task reads, ascending
    pub fn read_years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self
            .export_years
            .iter()
            .chain(self.tally_years.iter())
            .copied()
            .collect();
        years.sort_unstable();
        years.dedup();
        years
    }
}

/// By-year tasks: every inventoried station-year not known to be absent
pub fn plan_year_tasks(inventory: &StationYears, missing: &StationYears) -> Vec<CurationTask> {
    inventory
        .iter()
        .filter_map(|(station_id, years)| {
            let absent = missing.get(station_id);
            let export_years: Vec<i32> = years
                .iter()
                .copied()
                .filter(|year| !absent.is_some_and(|absent| absent.contains(year)))
                .collect();

            (!export_years.is_empty()).then(|| CurationTask {
                station_id: station_id.clone(),
                source: SourceKind::YearSource,
                export_years,
                tally_years: Vec::new(),
                needs_metadata: false,
            })
        })
        .collect()
}

/// By-station tasks: stations with missing years, plus stations lacking metadata
///
/// A station lacking metadata also tallies its by-year-owned years so that
/// count disagreements between the two layouts surface during reconciliation.
pub fn plan_station_tasks(
    inventory: &StationYears,
    missing: &StationYears,
    known_stations: &BTreeSet<String>,
) -> Vec<CurationTask> {
    let candidates: BTreeSet<&String> = inventory
        .keys()
        .filter(|station_id| !known_stations.contains(*station_id))
        .chain(missing.keys())
        .collect();

    candidates
        .into_iter()
        .filter_map(|station_id| {
            let export_years: Vec<i32> = missing
                .get(station_id)
                .map(|years| years.iter().copied().collect())
                .unwrap_or_default();
            let needs_metadata = !known_stations.contains(station_id);

            let tally_years: Vec<i32> = if needs_metadata {
                inventory
                    .get(station_id)
                    .map(|years| {
                        years
                            .iter()
                            .copied()
                            .filter(|year| !export_years.contains(year))
                            .collect()
                    })
                    .unwrap_or_default()
            } else {
                Vec::new()
            };

            if export_years.is_empty() && tally_years.is_empty() {
                return None;
            }

            Some(CurationTask {
                station_id: station_id.clone(),
                source: SourceKind::StationSource,
                export_years,
                tally_years,
                needs_metadata,
            })
        })
        .collect()
}
