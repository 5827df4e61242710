//! Variable catalog and column typing rules.
//!
//! The catalog declares which variables are partitioned, which attribute
//! columns travel with each variable, and which variables carry codes or free
//! text rather than measurements. It is injected into readers and the
//! partitioner so tests can substitute a smaller catalog.

use crate::constants::{
    ATTRIBUTE_SUFFIXES, COL_DAY, COL_ELEVATION, COL_HOUR, COL_LATITUDE, COL_LONGITUDE,
    COL_MINUTE, COL_MONTH, COL_STATION_ID, COL_STATION_NAME, COL_YEAR, FREE_TEXT_VARIABLES,
    GHCNH_VARIABLES, SKY_COVER_BASE_HEIGHT_PREFIX, SKY_COVER_PREFIX, WEATHER_PHENOMENON_PREFIX,
};
use polars::prelude::DataType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How a raw column is typed before parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Station_ID / Station_name
    Identity,
    /// Latitude / Longitude / Elevation
    Coordinate,
    /// Year / Month / Day / Hour / Minute
    DatePart,
    /// Measurement value, parsed as floating point
    Measurement,
    /// Weather-phenomenon or sky-cover code, or free text
    Code,
    /// Attribute column attached to a variable
    Attribute,
}

impl ColumnKind {
    /// Target type for the coercion pass
    pub fn target_type(&self) -> DataType {
        match self {
            ColumnKind::Identity | ColumnKind::Code | ColumnKind::Attribute => DataType::String,
            ColumnKind::DatePart => DataType::Int32,
            ColumnKind::Coordinate | ColumnKind::Measurement => DataType::Float64,
        }
    }
}

/// Immutable catalog of partitioned variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableCatalog {
    variables: Vec<String>,
    attribute_suffixes: Vec<String>,
    text_variables: BTreeSet<String>,
}

impl Default for VariableCatalog {
    fn default() -> Self {
        Self::new(GHCNH_VARIABLES.iter().copied())
    }
}

impl VariableCatalog {
    /// Catalog over the given variables with the standard GHCNh attributes
    pub fn new<I, S>(variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let variables: Vec<String> = variables.into_iter().map(Into::into).collect();
        let text_variables = variables
            .iter()
            .filter(|var| is_code_variable(var))
            .cloned()
            .collect();

        Self {
            variables,
            attribute_suffixes: ATTRIBUTE_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            text_variables,
        }
    }

    /// Replace the attribute suffixes
    pub fn with_attribute_suffixes<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attribute_suffixes = suffixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn attribute_suffixes(&self) -> &[String] {
        &self.attribute_suffixes
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn contains(&self, variable: &str) -> bool {
        self.variables.iter().any(|v| v == variable)
    }

    /// Value column followed by its attribute columns
    pub fn columns_for(&self, variable: &str) -> Vec<String> {
        std::iter::once(variable.to_string())
            .chain(
                self.attribute_suffixes
                    .iter()
                    .map(|suffix| format!("{variable}{suffix}")),
            )
            .collect()
    }

    /// Classify a raw column for the coercion pass
    pub fn column_kind(&self, column_name: &str) -> ColumnKind {
        match column_name {
            COL_STATION_ID | COL_STATION_NAME => ColumnKind::Identity,
            COL_LATITUDE | COL_LONGITUDE | COL_ELEVATION => ColumnKind::Coordinate,
            COL_YEAR | COL_MONTH | COL_DAY | COL_HOUR | COL_MINUTE => ColumnKind::DatePart,
            name if self.text_variables.contains(name) => ColumnKind::Code,
            name if self
                .attribute_suffixes
                .iter()
                .any(|suffix| name.ends_with(suffix.as_str())) =>
            {
                ColumnKind::Attribute
            }
            name if is_code_variable(name) => ColumnKind::Code,
            _ => ColumnKind::Measurement,
        }
    }
}

/// Weather-phenomenon codes, sky-cover codes and free text
fn is_code_variable(name: &str) -> bool {
    name.starts_with(WEATHER_PHENOMENON_PREFIX)
        || (name.starts_with(SKY_COVER_PREFIX) && !name.starts_with(SKY_COVER_BASE_HEIGHT_PREFIX))
        || FREE_TEXT_VARIABLES.contains(&name)
}
