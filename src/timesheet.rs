use std::time::{Duration, Instant};

use chrono::NaiveDate;
use log::{info, warn};

use crate::{
    calendar::{Calendar, Clock},
    category::{Category, CategoryId, CategoryRegistry, Color},
    constants::{COLORS, TIME_SETTINGS},
    entity::{CategoriesDocument, from_entity, to_entity},
    error::{Error, Result},
    manager::TrackManager,
    refresh::{RefreshTick, RefreshTimer},
    report::{ReportPeriod, ReportSummary, build_period_report},
    storage::{self, Snapshot, Store},
    track::Track,
};

/// Categories and their tracks, kept in step with a [`Store`].
///
/// Every mutation that succeeds writes the documents it touched before
/// returning. Reads materialize the running interval in memory only.
pub struct Timesheet {
    registry: CategoryRegistry,
    manager: TrackManager,
    store: Box<dyn Store>,
    refresh_interval: Duration,
    refresh: Option<RefreshTimer>,
    refresh_generation: u64,
}

impl Timesheet {
    /// Loads both documents from `store`. Absent documents start empty; any
    /// other failure is returned so the caller can retry or fall back to
    /// [`Timesheet::empty`].
    pub fn open(store: Box<dyn Store>, calendar: Calendar, clock: Box<dyn Clock>) -> Result<Self> {
        let mut registry = match storage::load_categories(store.as_ref())? {
            Some(document) => CategoryRegistry::from_categories(document.categories)?,
            None => CategoryRegistry::new(),
        };

        let events = registry.subscribe();
        let manager = match storage::load_track_manager(store.as_ref())? {
            Some(entity) => from_entity(entity, &registry, calendar, clock, events)?,
            None => TrackManager::new(calendar, clock, events),
        };

        info!(
            "event=timesheet_open module=timesheet status=ok categories={}",
            registry.len()
        );
        Ok(Self::assemble(registry, manager, store))
    }

    pub fn empty(store: Box<dyn Store>, calendar: Calendar, clock: Box<dyn Clock>) -> Self {
        let mut registry = CategoryRegistry::new();
        let manager = TrackManager::new(calendar, clock, registry.subscribe());
        Self::assemble(registry, manager, store)
    }

    fn assemble(registry: CategoryRegistry, manager: TrackManager, store: Box<dyn Store>) -> Self {
        let mut timesheet = Self {
            registry,
            manager,
            store,
            refresh_interval: Duration::from_millis(TIME_SETTINGS.refresh_interval_ms),
            refresh: None,
            refresh_generation: 0,
        };
        timesheet.rearm_refresh(Instant::now());
        timesheet
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self.rearm_refresh(Instant::now());
        self
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn calendar(&self) -> Calendar {
        self.manager.calendar()
    }

    pub fn today(&self) -> NaiveDate {
        self.manager.today()
    }

    pub fn category_id(&self, title: &str) -> Result<CategoryId> {
        self.registry
            .find(title.trim())
            .map(|category| category.id)
            .ok_or_else(|| Error::UnknownCategory(title.to_string()))
    }

    fn index_of(&self, title: &str) -> Result<usize> {
        let id = self.category_id(title)?;
        self.registry
            .position(id)
            .ok_or_else(|| Error::UnknownCategory(title.to_string()))
    }

    /// Adds a category at `index`, or at the end. Without a color, the next
    /// palette color is used.
    pub fn add_category(
        &mut self,
        title: &str,
        color: Option<Color>,
        index: Option<usize>,
    ) -> Result<Category> {
        let color = color.unwrap_or(COLORS[self.registry.len() % COLORS.len()]);
        let index = index.unwrap_or(self.registry.len());
        let category = self.registry.create(title, color);
        self.registry.insert(category.clone(), index)?;
        self.persist_categories()?;
        Ok(category)
    }

    pub fn rename_category(&mut self, title: &str, new_title: &str) -> Result<()> {
        let id = self.category_id(title)?;
        self.registry.rename(id, new_title)?;
        self.persist_categories()?;
        self.persist_tracks()
    }

    pub fn recolor_category(&mut self, title: &str, color: Color) -> Result<()> {
        let id = self.category_id(title)?;
        self.registry.set_color(id, color)?;
        self.persist_categories()
    }

    pub fn move_category(&mut self, from: usize, to: usize) -> Result<()> {
        self.registry.move_category(from, to)?;
        self.persist_categories()
    }

    /// Removes the category at `index` together with all of its tracks.
    pub fn remove_category(&mut self, index: usize) -> Result<Category> {
        let removed = self.registry.remove(index)?;
        self.rearm_refresh(Instant::now());
        self.persist_categories()?;
        self.persist_tracks()?;
        Ok(removed)
    }

    pub fn remove_category_named(&mut self, title: &str) -> Result<Category> {
        let index = self.index_of(title)?;
        self.remove_category(index)
    }

    pub fn start(&mut self, title: &str) -> Result<Track> {
        let id = self.category_id(title)?;
        let previous = self.manager.running_category();
        let track = self.manager.start(id)?;
        if previous != Some(id) {
            self.rearm_refresh(Instant::now());
        }
        self.persist_tracks()?;
        Ok(track)
    }

    pub fn stop(&mut self) -> Result<Option<Track>> {
        let stopped = self.manager.stop()?;
        if stopped.is_some() {
            self.rearm_refresh(Instant::now());
            self.persist_tracks()?;
        }
        Ok(stopped)
    }

    pub fn tracks(&mut self) -> Result<Vec<Track>> {
        Ok(self.manager.tracks()?)
    }

    pub fn running_track(&mut self) -> Result<Option<Track>> {
        Ok(self.manager.running_track()?)
    }

    pub fn running_category(&mut self) -> Option<Category> {
        let id = self.manager.running_category()?;
        self.registry.get(id).cloned()
    }

    pub fn is_running(&mut self, title: &str) -> Result<bool> {
        let id = self.category_id(title)?;
        Ok(self.manager.is_running(id))
    }

    pub fn current_track(&mut self, title: &str) -> Result<Track> {
        let id = self.category_id(title)?;
        Ok(self.manager.current_track(id)?)
    }

    pub fn set_duration(&mut self, title: &str, day: NaiveDate, seconds: u32) -> Result<Track> {
        let id = self.category_id(title)?;
        let track = self.manager.set_duration(id, day, seconds)?;
        self.persist_tracks()?;
        Ok(track)
    }

    pub fn report(&mut self, period: ReportPeriod) -> Result<ReportSummary> {
        let today = self.manager.today();
        let tracks = self
            .manager
            .tracks_between(period.first_day(today), today)?;
        Ok(build_period_report(&tracks, &self.registry, period, today))
    }

    pub fn refresh_timer(&self) -> Option<&RefreshTimer> {
        self.refresh.as_ref()
    }

    /// Polls the refresh timer and, when it is due, returns the freshly
    /// materialized running track.
    pub fn poll_refresh(&mut self, now: Instant) -> Result<Option<Track>> {
        let tick = match self.refresh.as_mut() {
            Some(timer) => timer.poll(now),
            None => None,
        };
        match tick {
            Some(tick) => self.handle_tick(tick),
            None => Ok(None),
        }
    }

    /// Answers a tick with a read of the running track. Ticks from a timer
    /// that has since been replaced are ignored.
    pub fn handle_tick(&mut self, tick: RefreshTick) -> Result<Option<Track>> {
        if tick.generation != self.refresh_generation || !self.manager.is_running(tick.category) {
            return Ok(None);
        }
        self.running_track()
    }

    /// Writes both documents.
    pub fn save(&mut self) -> Result<()> {
        self.persist_categories()?;
        self.persist_tracks()
    }

    fn rearm_refresh(&mut self, now: Instant) {
        self.refresh_generation += 1;
        self.refresh = self.manager.running_category().map(|category| {
            RefreshTimer::arm(
                category,
                self.refresh_generation,
                self.refresh_interval,
                now,
            )
        });
    }

    fn persist_categories(&mut self) -> Result<()> {
        let snapshot = Snapshot::Categories(CategoriesDocument::from_registry(&self.registry));
        self.persist(&snapshot)
    }

    fn persist_tracks(&mut self) -> Result<()> {
        let entity = to_entity(&mut self.manager, &self.registry)?;
        self.persist(&Snapshot::TrackManager(entity))
    }

    fn persist(&mut self, snapshot: &Snapshot) -> Result<()> {
        storage::persist(self.store.as_mut(), snapshot).map_err(|err| {
            warn!(
                "event=snapshot_persist module=timesheet status=error key={} error={}",
                snapshot.key(),
                err
            );
            Error::from(err)
        })
    }
}
