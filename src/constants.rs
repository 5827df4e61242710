//! Application constants for the GHCNh curator
//!
//! This module contains the default variable catalog, raw column names,
//! file naming conventions and sentinel values used throughout the pipeline.

// =============================================================================
// Variable Catalog Defaults
// =============================================================================

/// Hourly variables declared by GHCNh, one partition family each
pub const GHCNH_VARIABLES: &[&str] = &[
    "temperature",
    "dew_point_temperature",
    "station_level_pressure",
    "sea_level_pressure",
    "wind_direction",
    "wind_speed",
    "wind_gust",
    "precipitation",
    "relative_humidity",
    "wet_bulb_temperature",
    "pres_wx_MW1",
    "pres_wx_MW2",
    "pres_wx_MW3",
    "pres_wx_AU1",
    "pres_wx_AU2",
    "pres_wx_AU3",
    "pres_wx_AW1",
    "pres_wx_AW2",
    "pres_wx_AW3",
    "snow_depth",
    "visibility",
    "altimeter",
    "pressure_3hr_change",
    "sky_cover_1",
    "sky_cover_2",
    "sky_cover_3",
    "sky_cover_baseht_1",
    "sky_cover_baseht_2",
    "sky_cover_baseht_3",
    "precipitation_3_hour",
    "precipitation_6_hour",
    "precipitation_9_hour",
    "precipitation_12_hour",
    "precipitation_15_hour",
    "precipitation_18_hour",
    "precipitation_21_hour",
    "precipitation_24_hour",
    "remarks",
];

/// Attribute column suffixes attached to every variable column
pub const ATTRIBUTE_SUFFIXES: &[&str] = &[
    "_Measurement_Code",
    "_Quality_Code",
    "_Report_Type",
    "_Source_Code",
    "_Source_Station_ID",
];

/// Variable name prefix for present-weather phenomenon codes
pub const WEATHER_PHENOMENON_PREFIX: &str = "pres_wx_";

/// Variable name prefix for sky-cover codes (base heights are numeric)
pub const SKY_COVER_PREFIX: &str = "sky_cover_";
pub const SKY_COVER_BASE_HEIGHT_PREFIX: &str = "sky_cover_baseht_";

/// Free-text variables
pub const FREE_TEXT_VARIABLES: &[&str] = &["remarks"];

// =============================================================================
// Raw Column Names
// =============================================================================

pub const COL_STATION_ID: &str = "Station_ID";
pub const COL_STATION_NAME: &str = "Station_name";
pub const COL_DATE: &str = "DATE";
pub const COL_LATITUDE: &str = "Latitude";
pub const COL_LONGITUDE: &str = "Longitude";
pub const COL_ELEVATION: &str = "Elevation";
pub const COL_YEAR: &str = "Year";
pub const COL_MONTH: &str = "Month";
pub const COL_DAY: &str = "Day";
pub const COL_HOUR: &str = "Hour";
pub const COL_MINUTE: &str = "Minute";

/// Station-identifying columns removed from canonical tables
pub const STATION_IDENTITY_COLUMNS: &[&str] = &[
    COL_STATION_ID,
    COL_STATION_NAME,
    COL_LATITUDE,
    COL_LONGITUDE,
    COL_ELEVATION,
];

/// Separate date-part columns of the by-station layout
pub const DATE_PART_COLUMNS: &[&str] = &[COL_YEAR, COL_MONTH, COL_DAY, COL_HOUR, COL_MINUTE];

/// Timestamp column of canonical tables and partitions
pub const TIME_COLUMN: &str = "time";

// =============================================================================
// Timestamps
// =============================================================================

/// Accepted DATE string formats, tried in order
pub const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

// =============================================================================
// Metadata Artifacts
// =============================================================================

/// Elevation sentinel meaning "unknown"
pub const MISSING_ELEVATION: f64 = -999.9;

pub const STATION_LIST_COLUMNS: [&str; 5] = ["station_id", "lat", "lon", "elevation", "station_name"];

pub const INVENTORY_STATION_COLUMN: &str = "station_id";
pub const INVENTORY_YEAR_COLUMN: &str = "year";
pub const INVENTORY_COUNT_COLUMN: &str = "count";
pub const INVENTORY_VARIABLE_COLUMN: &str = "variable";

// =============================================================================
// Layout
// =============================================================================

pub const DATASET_DIR_NAME: &str = "GHCNh";

/// Default data root directory name under the user data directory
pub const DEFAULT_DATA_ROOT_DIR: &str = "pyseasters";

pub const DATA_DIR: &str = "data";
pub const METADATA_DIR: &str = "metadata";
pub const BY_STATION_DIR: &str = "by-station";
pub const BY_YEAR_DIR: &str = "by-year";

pub const STATION_LIST_FILE: &str = "ghcnh-station-list.parquet";
pub const STATION_YEAR_INVENTORY_FILE: &str = "ghcnh-inventory.parquet";
pub const MISSING_BY_YEAR_FILE: &str = "ghcnh-station-year-missing-by-year.parquet";
pub const YEAR_SOURCE_SNAPSHOT_FILE: &str = "ghcnh-inventory-by-year-source.parquet";

// =============================================================================
// Worker Pool Defaults
// =============================================================================

/// Host memory usage above which worker concurrency is halved
pub const DEFAULT_MEMORY_PRESSURE_THRESHOLD: f64 = 0.8;

/// Retries granted to a worker that panicked
pub const DEFAULT_MAX_RETRIES: usize = 1;

/// In-memory expansion of a Parquet input relative to its size on disk
pub const PARQUET_EXPANSION_FACTOR: u64 = 6;

/// In-memory expansion of a pipe-separated input relative to its size on disk
pub const PSV_EXPANSION_FACTOR: u64 = 3;
