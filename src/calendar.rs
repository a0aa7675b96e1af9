use std::{cell::Cell, rc::Rc};

use chrono::{
    DateTime, Duration as ChronoDuration, FixedOffset, Local, LocalResult, NaiveDate,
    NaiveDateTime, NaiveTime, Offset, SubsecRound, TimeZone, Utc,
};

pub const SECONDS_PER_NOMINAL_DAY: u32 = 86_400;

// Quarter-hour probes cover every DST gap in use (30 and 60 minute shifts).
const GAP_PROBE_MINUTES: i64 = 15;
const GAP_PROBE_STEPS: usize = 4 * 24;

/// The single calendar every day key in the system is computed against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Calendar {
    Local,
    Fixed(FixedOffset),
}

impl Calendar {
    pub fn utc() -> Self {
        Calendar::Fixed(Utc.fix())
    }

    pub fn from_offset_seconds(seconds: i32) -> Option<Self> {
        FixedOffset::east_opt(seconds).map(Calendar::Fixed)
    }

    pub fn day_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            Calendar::Local => instant.with_timezone(&Local).date_naive(),
            Calendar::Fixed(offset) => instant.with_timezone(offset).date_naive(),
        }
    }

    /// First instant of `day`. Ambiguous midnights resolve to the earlier
    /// instant; a midnight skipped by a DST gap resolves to the first local
    /// time that exists after it.
    pub fn start_of_day(&self, day: NaiveDate) -> DateTime<Utc> {
        match self {
            Calendar::Local => start_of_day_in(&Local, day),
            Calendar::Fixed(offset) => start_of_day_in(offset, day),
        }
    }

    pub fn start_of_next_day(&self, day: NaiveDate) -> DateTime<Utc> {
        match self {
            Calendar::Local => start_of_next_day_in(&Local, day),
            Calendar::Fixed(offset) => start_of_next_day_in(offset, day),
        }
    }

    /// Seconds between this day's start and the next one's, so 23 or 25
    /// hours on DST transition days.
    pub fn length_of_day(&self, day: NaiveDate) -> u32 {
        match self {
            Calendar::Local => length_of_day_in(&Local, day),
            Calendar::Fixed(offset) => length_of_day_in(offset, day),
        }
    }
}

fn start_of_day_in<Tz: TimeZone>(zone: &Tz, day: NaiveDate) -> DateTime<Utc> {
    resolve_local(zone, day.and_time(NaiveTime::MIN))
}

fn start_of_next_day_in<Tz: TimeZone>(zone: &Tz, day: NaiveDate) -> DateTime<Utc> {
    match day.succ_opt() {
        Some(next) => start_of_day_in(zone, next),
        None => start_of_day_in(zone, day)
            .checked_add_signed(ChronoDuration::seconds(SECONDS_PER_NOMINAL_DAY.into()))
            .unwrap_or(DateTime::<Utc>::MAX_UTC),
    }
}

fn length_of_day_in<Tz: TimeZone>(zone: &Tz, day: NaiveDate) -> u32 {
    let seconds = (start_of_next_day_in(zone, day) - start_of_day_in(zone, day)).num_seconds();
    u32::try_from(seconds).unwrap_or(SECONDS_PER_NOMINAL_DAY)
}

fn resolve_local<Tz: TimeZone>(zone: &Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    let mut probe = naive;
    for _ in 0..=GAP_PROBE_STEPS {
        match zone.from_local_datetime(&probe) {
            LocalResult::Single(instant) => return instant.with_timezone(&Utc),
            LocalResult::Ambiguous(first, second) => {
                return first.min(second).with_timezone(&Utc);
            }
            LocalResult::None => probe += ChronoDuration::minutes(GAP_PROBE_MINUTES),
        }
    }
    naive.and_utc()
}

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same reading.
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Rc<Cell<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        self.now.set(instant);
    }

    pub fn advance(&self, seconds: i64) {
        self.now
            .set(self.now.get() + ChronoDuration::seconds(seconds));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

pub(crate) fn whole_seconds(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.trunc_subsecs(0)
}
