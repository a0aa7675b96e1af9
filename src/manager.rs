use std::{
    collections::{BTreeMap, HashSet},
    sync::mpsc::Receiver,
};

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use itertools::Itertools;
use log::{debug, info, warn};

use crate::{
    calendar::{Calendar, Clock, whole_seconds},
    category::{CategoryEvent, CategoryId},
    error::TrackError,
    track::{Track, TrackKey, split_interval},
};

/// The open interval of the category currently being tracked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Running {
    pub category: CategoryId,
    pub start: DateTime<Utc>,
}

/// Categories whose finished days have already been flushed into the idle
/// set, valid for one calendar day only.
#[derive(Clone, Debug, Default)]
struct UpdatedDay {
    day: Option<NaiveDate>,
    categories: HashSet<CategoryId>,
}

impl UpdatedDay {
    fn roll_to(&mut self, today: NaiveDate) {
        if self.day != Some(today) {
            self.day = Some(today);
            self.categories.clear();
        }
    }
}

/// Idle tracks plus at most one running interval.
///
/// Every read that reports the running category materializes it: finished
/// days are moved into the idle set and the running start is moved up to
/// the start of the still-open segment. Reads therefore take `&mut self`.
///
/// Category removals published by the registry are applied at the start of
/// every operation.
pub struct TrackManager {
    calendar: Calendar,
    clock: Box<dyn Clock>,
    idle: BTreeMap<TrackKey, Track>,
    running: Option<Running>,
    updated: UpdatedDay,
    events: Receiver<CategoryEvent>,
}

impl TrackManager {
    pub fn new(calendar: Calendar, clock: Box<dyn Clock>, events: Receiver<CategoryEvent>) -> Self {
        Self {
            calendar,
            clock,
            idle: BTreeMap::new(),
            running: None,
            updated: UpdatedDay::default(),
            events,
        }
    }

    pub fn calendar(&self) -> Calendar {
        self.calendar
    }

    pub fn now(&self) -> DateTime<Utc> {
        whole_seconds(self.clock.now())
    }

    pub fn today(&self) -> NaiveDate {
        self.calendar.day_of(self.now())
    }

    /// Starts `category`, stopping whatever else is running first. Resumes
    /// today's track for `category` when one exists.
    pub fn start(&mut self, category: CategoryId) -> Result<Track, TrackError> {
        self.sync_registry();

        if let Some(running) = self.running {
            if running.category == category {
                return self.materialize()?.ok_or_else(|| {
                    TrackError::InvariantViolation("running state vanished".to_string())
                });
            }
            self.finish_running()?;
        }

        let now = self.now();
        let today = self.calendar.day_of(now);
        let key = TrackKey {
            category,
            day: today,
        };

        let track = match self.idle.remove(&key) {
            Some(track) => {
                let mut start = now - ChronoDuration::seconds(track.duration().into());
                let day_start = self.calendar.start_of_day(today);
                if start < day_start {
                    warn!(
                        "event=track_resume module=manager status=clamped category={} duration={}",
                        category.0,
                        track.duration()
                    );
                    start = day_start;
                }
                self.running = Some(Running { category, start });
                Track::new(category, today, seconds_between(start, now)?, &self.calendar)?
            }
            None => {
                self.running = Some(Running {
                    category,
                    start: now,
                });
                Track::zero(category, today)
            }
        };

        info!(
            "event=track_start module=manager status=ok category={} resumed_seconds={}",
            category.0,
            track.duration()
        );
        Ok(track)
    }

    /// Finalizes the running interval into idle tracks. Returns the track of
    /// the day that was open, or `None` when nothing was running.
    pub fn stop(&mut self) -> Result<Option<Track>, TrackError> {
        self.sync_registry();
        let finished = self.finish_running()?;
        if let Some(track) = finished {
            info!(
                "event=track_stop module=manager status=ok category={} seconds={}",
                track.category().0,
                track.duration()
            );
        }
        Ok(finished)
    }

    /// All tracks, idle and running, ordered by day then category.
    pub fn tracks(&mut self) -> Result<Vec<Track>, TrackError> {
        self.sync_registry();
        let open = self.materialize()?;
        Ok(self
            .idle
            .values()
            .copied()
            .chain(open)
            .sorted_by_key(|track| (track.day(), track.category()))
            .collect())
    }

    /// Tracks whose day lies within `first..=last`.
    pub fn tracks_between(
        &mut self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<Track>, TrackError> {
        Ok(self
            .tracks()?
            .into_iter()
            .filter(|track| track.day() >= first && track.day() <= last)
            .collect())
    }

    pub fn running_track(&mut self) -> Result<Option<Track>, TrackError> {
        self.sync_registry();
        self.materialize()
    }

    pub fn running_category(&mut self) -> Option<CategoryId> {
        self.sync_registry();
        self.running.map(|running| running.category)
    }

    pub fn is_running(&mut self, category: CategoryId) -> bool {
        self.running_category() == Some(category)
    }

    /// Today's track for `category`, zero when nothing was recorded yet.
    pub fn current_track(&mut self, category: CategoryId) -> Result<Track, TrackError> {
        self.sync_registry();
        if let Some(open) = self.materialize()? {
            if open.category() == category {
                return Ok(open);
            }
        }

        let today = self.today();
        Ok(self
            .idle
            .get(&TrackKey {
                category,
                day: today,
            })
            .copied()
            .unwrap_or_else(|| Track::zero(category, today)))
    }

    /// Overwrites the idle track of `category` on `day`.
    ///
    /// The day currently open for the running category and days after
    /// today cannot be edited. For today, the duration cannot exceed the
    /// time elapsed since midnight.
    pub fn set_duration(
        &mut self,
        category: CategoryId,
        day: NaiveDate,
        duration: u32,
    ) -> Result<Track, TrackError> {
        self.sync_registry();
        if let Some(open) = self.materialize()? {
            if open.key() == (TrackKey { category, day }) {
                return Err(TrackError::RunningDay { category, day });
            }
        }

        let now = self.now();
        let today = self.calendar.day_of(now);
        if day > today {
            return Err(TrackError::FutureDay { day, today });
        }

        let track = Track::new(category, day, duration, &self.calendar)?;
        if day == today {
            let elapsed = seconds_between(self.calendar.start_of_day(day), now)?;
            if duration > elapsed {
                return Err(TrackError::DurationOutOfRange {
                    day,
                    duration,
                    max: elapsed,
                });
            }
        }

        self.idle.insert(track.key(), track);
        debug!(
            "event=track_set_duration module=manager status=ok category={} day={} seconds={}",
            category.0, day, duration
        );
        Ok(track)
    }

    /// Drops every track of `category`. A running interval for it is
    /// discarded without being recorded.
    pub fn remove_all_tracks(&mut self, category: CategoryId) {
        self.sync_registry();
        self.purge(category);
    }

    /// Idle tracks as they stand, without materializing the running interval.
    pub fn idle_tracks(&self) -> impl Iterator<Item = &Track> {
        self.idle.values()
    }

    /// The running pointer as last materialized.
    pub fn running(&self) -> Option<Running> {
        self.running
    }

    pub(crate) fn insert_idle(&mut self, track: Track) -> Option<Track> {
        self.idle.insert(track.key(), track)
    }

    pub(crate) fn set_running(&mut self, running: Option<Running>) {
        self.running = running;
    }

    /// Moves finished days of the running interval into the idle set and
    /// returns the open track. Repeating the call without the clock moving
    /// yields the same track and leaves the idle set untouched.
    pub(crate) fn materialize(&mut self) -> Result<Option<Track>, TrackError> {
        let Some(running) = self.running else {
            return Ok(None);
        };

        let now = self.now();
        let today = self.calendar.day_of(now);
        let start = if now < running.start {
            warn!(
                "event=track_materialize module=manager status=clock_skew category={} start={} now={}",
                running.category.0, running.start, now
            );
            now
        } else {
            running.start
        };

        self.updated.roll_to(today);
        if self.updated.categories.contains(&running.category)
            && self.calendar.day_of(start) == today
        {
            let open = Track::new(
                running.category,
                today,
                seconds_between(start, now)?,
                &self.calendar,
            )
            .map_err(|err| TrackError::InvariantViolation(err.to_string()))?;
            self.running = Some(Running {
                category: running.category,
                start,
            });
            return Ok(Some(open));
        }

        let split = split_interval(running.category, start, now, &self.calendar)?;
        if let Some(clash) = split
            .completed
            .iter()
            .chain([&split.open])
            .find(|track| self.idle.contains_key(&track.key()))
        {
            return Err(TrackError::InvariantViolation(format!(
                "running interval of category {} overlaps the recorded track on {}",
                clash.category(),
                clash.day()
            )));
        }
        if !split.completed.is_empty() {
            debug!(
                "event=track_materialize module=manager status=ok category={} flushed_days={}",
                running.category.0,
                split.completed.len()
            );
        }
        for track in split.completed {
            self.idle.insert(track.key(), track);
        }
        self.updated.categories.insert(running.category);
        self.running = Some(Running {
            category: running.category,
            start: split.open_start,
        });
        Ok(Some(split.open))
    }

    fn finish_running(&mut self) -> Result<Option<Track>, TrackError> {
        let open = self.materialize()?;
        if let Some(track) = open {
            self.idle.insert(track.key(), track);
        }
        self.running = None;
        Ok(open)
    }

    fn sync_registry(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                CategoryEvent::Removed(category) => self.purge(category.id),
            }
        }
    }

    fn purge(&mut self, category: CategoryId) {
        let before = self.idle.len();
        self.idle.retain(|key, _| key.category != category);
        let was_running = self
            .running
            .is_some_and(|running| running.category == category);
        if was_running {
            self.running = None;
        }
        self.updated.categories.remove(&category);
        info!(
            "event=track_purge module=manager status=ok category={} removed={} was_running={}",
            category.0,
            before - self.idle.len(),
            was_running
        );
    }
}

fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<u32, TrackError> {
    u32::try_from((end - start).num_seconds()).map_err(|_| {
        TrackError::InvariantViolation(format!("interval {} to {} is not representable", start, end))
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::TimeZone;

    use super::*;
    use crate::{
        calendar::ManualClock,
        category::CategoryRegistry,
        constants::COLORS,
    };

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    struct Fixture {
        registry: CategoryRegistry,
        manager: TrackManager,
        clock: ManualClock,
        work: CategoryId,
        sleep: CategoryId,
    }

    fn fixture(at: DateTime<Utc>) -> Fixture {
        let mut registry = CategoryRegistry::new();
        let work = registry.create("Work", COLORS[0]);
        let sleep = registry.create("Sleep", COLORS[1]);
        let (work_id, sleep_id) = (work.id, sleep.id);
        registry.insert(work, 0).unwrap();
        registry.insert(sleep, 1).unwrap();

        let clock = ManualClock::new(at);
        let manager = TrackManager::new(
            Calendar::utc(),
            Box::new(clock.clone()),
            registry.subscribe(),
        );

        Fixture {
            registry,
            manager,
            clock,
            work: work_id,
            sleep: sleep_id,
        }
    }

    fn track(category: CategoryId, day: NaiveDate, seconds: u32) -> Track {
        Track::new(category, day, seconds, &Calendar::utc()).unwrap()
    }

    fn assert_unique_keys(tracks: &[Track]) {
        let keys: HashSet<TrackKey> = tracks.iter().map(Track::key).collect();
        assert_eq!(keys.len(), tracks.len());
    }

    #[test]
    fn test_start_creates_zero_track() {
        let mut f = fixture(utc(2024, 1, 1, 9, 0, 0));

        let started = f.manager.start(f.work).unwrap();
        assert_eq!(started, Track::zero(f.work, date(2024, 1, 1)));
        assert!(f.manager.is_running(f.work));
        assert!(!f.manager.is_running(f.sleep));
    }

    #[test]
    fn test_start_same_category_returns_live_track() {
        let mut f = fixture(utc(2024, 1, 1, 9, 0, 0));
        f.manager.start(f.work).unwrap();
        f.clock.advance(120);

        let again = f.manager.start(f.work).unwrap();
        assert_eq!(again, track(f.work, date(2024, 1, 1), 120));
    }

    #[test]
    fn test_materialize_splits_running_interval_at_midnight() {
        let mut f = fixture(utc(2024, 1, 1, 23, 0, 0));
        f.manager.start(f.work).unwrap();
        f.clock.set(utc(2024, 1, 2, 1, 30, 0));

        let running = f.manager.running_track().unwrap().unwrap();
        assert_eq!(running, track(f.work, date(2024, 1, 2), 5400));
        assert_eq!(
            f.manager.idle_tracks().copied().collect::<Vec<_>>(),
            vec![track(f.work, date(2024, 1, 1), 3600)]
        );
        assert_eq!(
            f.manager.running(),
            Some(Running {
                category: f.work,
                start: utc(2024, 1, 2, 0, 0, 0)
            })
        );
    }

    #[test]
    fn test_repeated_reads_are_idempotent() {
        let mut f = fixture(utc(2024, 1, 1, 20, 0, 0));
        f.manager.start(f.work).unwrap();
        f.clock.set(utc(2024, 1, 4, 6, 0, 0));

        let first = f.manager.tracks().unwrap();
        let running_after_first = f.manager.running();
        let second = f.manager.tracks().unwrap();

        assert_eq!(first, second);
        assert_eq!(f.manager.running(), running_after_first);
        assert_eq!(first.len(), 4);
        assert_eq!(f.manager.idle_tracks().count(), 3);
    }

    #[test]
    fn test_materialized_durations_sum_to_elapsed_time() {
        let start = utc(2024, 1, 1, 13, 14, 15);
        let mut f = fixture(start);
        f.manager.start(f.work).unwrap();

        for step in [59, 3_600, 40_000, 90_001, 7] {
            f.clock.advance(step);
            let total: i64 = f
                .manager
                .tracks()
                .unwrap()
                .iter()
                .map(|t| i64::from(t.duration()))
                .sum();
            assert_eq!(total, (f.clock.now() - start).num_seconds());
        }
    }

    #[test]
    fn test_stop_records_running_track() {
        let mut f = fixture(utc(2024, 1, 1, 9, 0, 0));
        f.manager.start(f.work).unwrap();
        f.clock.advance(1800);

        let stopped = f.manager.stop().unwrap();
        assert_eq!(stopped, Some(track(f.work, date(2024, 1, 1), 1800)));
        assert_eq!(f.manager.running_track().unwrap(), None);
        assert_eq!(f.manager.stop().unwrap(), None);

        f.clock.advance(600);
        assert_eq!(
            f.manager.tracks().unwrap(),
            vec![track(f.work, date(2024, 1, 1), 1800)]
        );
    }

    #[test]
    fn test_restart_resumes_todays_track() {
        let mut f = fixture(utc(2024, 1, 1, 9, 0, 0));
        f.manager.start(f.work).unwrap();
        f.clock.advance(600);
        f.manager.stop().unwrap();
        f.clock.advance(3600);

        let resumed = f.manager.start(f.work).unwrap();
        assert_eq!(resumed, track(f.work, date(2024, 1, 1), 600));

        f.clock.advance(60);
        assert_eq!(
            f.manager.tracks().unwrap(),
            vec![track(f.work, date(2024, 1, 1), 660)]
        );
    }

    #[test]
    fn test_switching_category_finalizes_previous() {
        let mut f = fixture(utc(2024, 1, 1, 9, 0, 0));
        f.manager.start(f.work).unwrap();
        f.clock.advance(300);
        f.manager.start(f.sleep).unwrap();
        f.clock.advance(100);

        assert!(f.manager.is_running(f.sleep));
        assert_eq!(
            f.manager.current_track(f.work).unwrap(),
            track(f.work, date(2024, 1, 1), 300)
        );
        assert_eq!(
            f.manager.current_track(f.sleep).unwrap(),
            track(f.sleep, date(2024, 1, 1), 100)
        );
    }

    #[test]
    fn test_current_track_defaults_to_zero() {
        let mut f = fixture(utc(2024, 1, 1, 9, 0, 0));
        assert_eq!(
            f.manager.current_track(f.work).unwrap(),
            Track::zero(f.work, date(2024, 1, 1))
        );
    }

    #[test]
    fn test_registry_removal_discards_running_and_idle_tracks() {
        let mut f = fixture(utc(2024, 1, 1, 9, 0, 0));
        f.manager.start(f.work).unwrap();
        f.clock.advance(600);
        f.manager.stop().unwrap();
        f.manager.start(f.sleep).unwrap();
        f.clock.set(utc(2024, 1, 2, 9, 0, 0));
        f.manager.start(f.work).unwrap();
        f.clock.advance(900);

        let index = f.registry.position(f.work).unwrap();
        f.registry.remove(index).unwrap();

        assert_eq!(f.manager.running_category(), None);
        let remaining = f.manager.tracks().unwrap();
        assert!(remaining.iter().all(|t| t.category() == f.sleep));
        assert_eq!(remaining.len(), 2);
    }

    #[test]
    fn test_remove_all_tracks_does_not_materialize() {
        let mut f = fixture(utc(2024, 1, 1, 22, 0, 0));
        f.manager.start(f.work).unwrap();
        f.clock.set(utc(2024, 1, 3, 1, 0, 0));

        f.manager.remove_all_tracks(f.work);
        assert_eq!(f.manager.running(), None);
        assert!(f.manager.tracks().unwrap().is_empty());
    }

    #[test]
    fn test_set_duration_overwrites_past_day() {
        let mut f = fixture(utc(2024, 1, 1, 9, 0, 0));
        f.manager.start(f.work).unwrap();
        f.clock.advance(600);
        f.manager.stop().unwrap();
        f.clock.set(utc(2024, 1, 5, 12, 0, 0));

        let edited = f.manager.set_duration(f.work, date(2024, 1, 1), 7200).unwrap();
        assert_eq!(edited, track(f.work, date(2024, 1, 1), 7200));
        assert_eq!(f.manager.tracks().unwrap(), vec![edited]);

        assert!(matches!(
            f.manager.set_duration(f.work, date(2024, 1, 1), 90_000),
            Err(TrackError::DurationOutOfRange { max: 86_400, .. })
        ));
        assert_eq!(f.manager.tracks().unwrap(), vec![edited]);
    }

    #[test]
    fn test_set_duration_rejects_open_running_day() {
        let mut f = fixture(utc(2024, 1, 2, 9, 0, 0));
        f.manager.start(f.work).unwrap();

        assert_eq!(
            f.manager.set_duration(f.work, date(2024, 1, 2), 60),
            Err(TrackError::RunningDay {
                category: f.work,
                day: date(2024, 1, 2)
            })
        );
        assert!(f.manager.set_duration(f.sleep, date(2024, 1, 2), 60).is_ok());
        assert!(f.manager.set_duration(f.work, date(2024, 1, 1), 60).is_ok());
    }

    #[test]
    fn test_set_duration_today_is_bounded_by_elapsed_time() {
        let mut f = fixture(utc(2024, 1, 2, 10, 0, 0));

        assert_eq!(
            f.manager.set_duration(f.work, date(2024, 1, 2), 40_000),
            Err(TrackError::DurationOutOfRange {
                day: date(2024, 1, 2),
                duration: 40_000,
                max: 36_000
            })
        );
        f.manager.set_duration(f.work, date(2024, 1, 2), 36_000).unwrap();

        let resumed = f.manager.start(f.work).unwrap();
        assert_eq!(resumed.duration(), 36_000);
        assert_eq!(
            f.manager.running().unwrap().start,
            utc(2024, 1, 2, 0, 0, 0)
        );
    }

    #[test]
    fn test_clock_moving_backwards_yields_empty_open_segment() {
        let mut f = fixture(utc(2024, 1, 1, 9, 0, 0));
        f.manager.start(f.work).unwrap();
        f.clock.set(utc(2024, 1, 1, 8, 0, 0));

        assert_eq!(
            f.manager.running_track().unwrap(),
            Some(Track::zero(f.work, date(2024, 1, 1)))
        );
    }

    #[test]
    fn test_keys_stay_unique_across_operation_sequence() {
        let mut f = fixture(utc(2024, 1, 1, 21, 0, 0));
        let steps: [(i64, Option<CategoryId>); 8] = [
            (1_800, Some(f.work)),
            (7_200, Some(f.sleep)),
            (600, None),
            (50, Some(f.work)),
            (86_400, Some(f.work)),
            (100, Some(f.sleep)),
            (3_000, None),
            (10, Some(f.sleep)),
        ];

        f.manager.start(f.work).unwrap();
        for (advance, next) in steps {
            f.clock.advance(advance);
            match next {
                Some(category) => {
                    f.manager.start(category).unwrap();
                }
                None => {
                    f.manager.stop().unwrap();
                }
            }
            assert_unique_keys(&f.manager.tracks().unwrap());
        }
    }

    #[test]
    fn test_set_duration_rejects_future_day() {
        let mut f = fixture(utc(2024, 1, 1, 22, 0, 0));
        let tomorrow = date(2024, 1, 2);

        assert_eq!(
            f.manager.set_duration(f.work, tomorrow, 100),
            Err(TrackError::FutureDay {
                day: tomorrow,
                today: date(2024, 1, 1),
            })
        );

        f.manager.start(f.work).unwrap();
        assert!(matches!(
            f.manager.set_duration(f.work, tomorrow, 100),
            Err(TrackError::FutureDay { .. })
        ));

        f.clock.set(utc(2024, 1, 2, 1, 0, 0));
        let tracks = f.manager.tracks().unwrap();
        assert_unique_keys(&tracks);
        assert_eq!(
            tracks,
            vec![
                track(f.work, date(2024, 1, 1), 7200),
                track(f.work, tomorrow, 3600),
            ]
        );
    }

    #[test]
    fn test_materialize_refuses_to_overwrite_recorded_day() {
        let mut f = fixture(utc(2024, 1, 2, 1, 0, 0));
        f.manager.insert_idle(track(f.work, date(2024, 1, 1), 500));
        f.manager.set_running(Some(Running {
            category: f.work,
            start: utc(2024, 1, 1, 23, 0, 0),
        }));

        assert!(matches!(
            f.manager.running_track(),
            Err(TrackError::InvariantViolation(_))
        ));
        assert_eq!(
            f.manager.idle_tracks().copied().collect::<Vec<_>>(),
            vec![track(f.work, date(2024, 1, 1), 500)]
        );
    }
}
