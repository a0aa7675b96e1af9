use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use crate::category::CategoryId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Track(#[from] TrackError),

    #[error(transparent)]
    Entity(#[from] EntityError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Category '{0}' not found")]
    UnknownCategory(String),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Category title cannot be empty")]
    EmptyTitle,

    #[error("Category title '{0}' is already in use")]
    DuplicateTitle(String),

    #[error("Category {0} is already registered")]
    DuplicateId(CategoryId),

    #[error("Category {0} is not registered")]
    UnknownCategory(CategoryId),

    #[error("Index {index} is out of bounds for {len} categories")]
    IndexOutOfBounds { index: usize, len: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackError {
    #[error("Duration of {duration}s on {day} exceeds the day length of {max}s")]
    DurationOutOfRange {
        day: NaiveDate,
        duration: u32,
        max: u32,
    },

    #[error("Category {category} is running on {day}; stop it before editing that day")]
    RunningDay { category: CategoryId, day: NaiveDate },

    #[error("Cannot record time on {day}, which is after today ({today})")]
    FutureDay { day: NaiveDate, today: NaiveDate },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntityError {
    #[error("Track entity references unknown category '{0}'")]
    UnresolvedCategory(String),

    #[error("Track entity has invalid date {year:04}-{month:02}-{day:02}")]
    InvalidDate { year: i32, month: u32, day: u32 },

    #[error("Duplicate track for category {category} on {day}")]
    DuplicateTrack { category: CategoryId, day: NaiveDate },

    #[error(transparent)]
    Track(#[from] TrackError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Could not access '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Document '{key}' is not valid JSON: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config file {path} is invalid: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("UTC offset of {0}s is out of range")]
    InvalidOffset(i32),

    #[error("Unsupported log level '{0}'; expected trace|debug|info|warn|error")]
    InvalidLogLevel(String),

    #[error("Refresh interval must be at least 1 ms")]
    InvalidRefreshInterval,
}
