//! Per-category, per-day time tracking.
//!
//! A [`CategoryRegistry`] holds the ordered categories. A [`TrackManager`]
//! records at most one running interval and splits it into one [`Track`] per
//! calendar day when observed. [`Timesheet`] ties both to a [`Store`].

pub mod calendar;
pub mod category;
pub mod cli;
pub mod config;
pub mod constants;
pub mod entity;
pub mod error;
pub mod logging;
pub mod manager;
pub mod refresh;
pub mod report;
pub mod storage;
pub mod timesheet;
pub mod track;

pub use calendar::{Calendar, Clock, ManualClock, SystemClock};
pub use category::{Category, CategoryEvent, CategoryId, CategoryRegistry, Color};
pub use entity::{TrackManagerEntity, from_entity, to_entity};
pub use error::{Error, Result};
pub use manager::{Running, TrackManager};
pub use storage::{FileStore, MemoryStore, Snapshot, Store};
pub use timesheet::Timesheet;
pub use track::{Track, TrackKey};
