use std::sync::mpsc::Receiver;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    calendar::{Calendar, Clock},
    category::{Category, CategoryEvent, CategoryId, CategoryRegistry},
    error::EntityError,
    manager::{Running, TrackManager},
    track::Track,
};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoriesDocument {
    pub categories: Vec<Category>,
}

impl CategoriesDocument {
    pub fn from_registry(registry: &CategoryRegistry) -> Self {
        CategoriesDocument {
            categories: registry.categories().to_vec(),
        }
    }
}

/// A track with its category written by id. The title is kept so the
/// document stays readable, and so documents written before ids existed
/// can still be loaded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<CategoryId>,
    pub category_title: String,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub duration_seconds: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<CategoryId>,
    pub category_title: String,
    pub start_date: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackManagerEntity {
    #[serde(default)]
    pub idle_tracks: Vec<TrackEntity>,
    #[serde(default)]
    pub running: Option<RunningEntity>,
}

/// Projects the manager into its storable form. The running interval is
/// materialized first, so the recorded start is the start of the open day.
pub fn to_entity(
    manager: &mut TrackManager,
    registry: &CategoryRegistry,
) -> Result<TrackManagerEntity, EntityError> {
    manager.running_track()?;

    let idle_tracks = manager
        .idle_tracks()
        .sorted_by_key(|track| (track.day(), track.category()))
        .map(|track| -> Result<TrackEntity, EntityError> {
            let category = lookup(registry, track.category())?;
            Ok(TrackEntity {
                category_id: Some(category.id),
                category_title: category.title.clone(),
                year: track.day().year(),
                month: track.day().month(),
                day: track.day().day(),
                duration_seconds: track.duration(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let running = match manager.running() {
        Some(running) => {
            let category = lookup(registry, running.category)?;
            Some(RunningEntity {
                category_id: Some(category.id),
                category_title: category.title.clone(),
                start_date: running.start,
            })
        }
        None => None,
    };

    Ok(TrackManagerEntity {
        idle_tracks,
        running,
    })
}

/// Rebuilds a manager from its stored form. Any reference that does not
/// resolve through `registry` fails the whole load, as does an idle track
/// of the running category on or after the day the interval started. A
/// stored running interval is partitioned again against the current clock.
pub fn from_entity(
    entity: TrackManagerEntity,
    registry: &CategoryRegistry,
    calendar: Calendar,
    clock: Box<dyn Clock>,
    events: Receiver<CategoryEvent>,
) -> Result<TrackManager, EntityError> {
    let mut manager = TrackManager::new(calendar, clock, events);

    for stored in &entity.idle_tracks {
        let category = resolve(registry, stored.category_id, &stored.category_title)?;
        let day = NaiveDate::from_ymd_opt(stored.year, stored.month, stored.day).ok_or(
            EntityError::InvalidDate {
                year: stored.year,
                month: stored.month,
                day: stored.day,
            },
        )?;
        let track = Track::new(category, day, stored.duration_seconds, &calendar)?;
        if manager.insert_idle(track).is_some() {
            return Err(EntityError::DuplicateTrack { category, day });
        }
    }

    if let Some(stored) = &entity.running {
        let category = resolve(registry, stored.category_id, &stored.category_title)?;
        let first_day = calendar.day_of(stored.start_date);
        if let Some(clash) = manager
            .idle_tracks()
            .find(|track| track.category() == category && track.day() >= first_day)
        {
            return Err(EntityError::DuplicateTrack {
                category,
                day: clash.day(),
            });
        }
        manager.set_running(Some(Running {
            category,
            start: stored.start_date,
        }));
        manager.running_track()?;
    }

    info!(
        "event=track_manager_load module=entity status=ok idle_tracks={} running={}",
        entity.idle_tracks.len(),
        entity.running.is_some()
    );
    Ok(manager)
}

fn lookup(registry: &CategoryRegistry, id: CategoryId) -> Result<&Category, EntityError> {
    registry
        .get(id)
        .ok_or_else(|| EntityError::UnresolvedCategory(id.to_string()))
}

fn resolve(
    registry: &CategoryRegistry,
    id: Option<CategoryId>,
    title: &str,
) -> Result<CategoryId, EntityError> {
    match id {
        Some(id) => lookup(registry, id).map(|category| category.id),
        None => {
            debug!(
                "event=category_resolve module=entity status=legacy_title title_len={}",
                title.len()
            );
            registry
                .find(title)
                .map(|category| category.id)
                .ok_or_else(|| EntityError::UnresolvedCategory(title.to_string()))
        }
    }
}
