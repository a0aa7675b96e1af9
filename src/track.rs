use chrono::{DateTime, NaiveDate, Utc};

use crate::{calendar::Calendar, category::CategoryId, error::TrackError};

/// Identity of a track. At most one track exists per key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackKey {
    pub category: CategoryId,
    pub day: NaiveDate,
}

/// Seconds accumulated by one category on one calendar day.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Track {
    category: CategoryId,
    day: NaiveDate,
    duration: u32,
}

impl Track {
    pub fn new(
        category: CategoryId,
        day: NaiveDate,
        duration: u32,
        calendar: &Calendar,
    ) -> Result<Self, TrackError> {
        let max = calendar.length_of_day(day);
        if duration > max {
            return Err(TrackError::DurationOutOfRange { day, duration, max });
        }
        Ok(Track {
            category,
            day,
            duration,
        })
    }

    pub fn zero(category: CategoryId, day: NaiveDate) -> Self {
        Track {
            category,
            day,
            duration: 0,
        }
    }

    pub fn category(&self) -> CategoryId {
        self.category
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn key(&self) -> TrackKey {
        TrackKey {
            category: self.category,
            day: self.day,
        }
    }
}

/// A piece of an interval that lies within a single calendar day.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub day: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Segment {
    pub fn seconds(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }
}

/// Cuts `[start, now)` at every calendar-day boundary it crosses.
///
/// Yields one segment per day touched, in order. The last segment is the
/// one containing `now` and may be empty. An interval that ends before it
/// starts yields a single empty segment at `now`.
pub fn partition(calendar: &Calendar, start: DateTime<Utc>, now: DateTime<Utc>) -> Vec<Segment> {
    if now <= start {
        return vec![Segment {
            day: calendar.day_of(now),
            start: now,
            end: now,
        }];
    }

    let mut segments = Vec::new();
    let mut day = calendar.day_of(start);
    let mut cursor = start;
    loop {
        let next_day_start = calendar.start_of_next_day(day);
        let next_day = day.succ_opt();
        match next_day {
            Some(next) if now >= next_day_start => {
                segments.push(Segment {
                    day,
                    start: cursor,
                    end: next_day_start,
                });
                cursor = next_day_start;
                day = next;
            }
            _ => {
                segments.push(Segment {
                    day,
                    start: cursor,
                    end: now,
                });
                return segments;
            }
        }
    }
}

/// A running interval turned into tracks: finished days plus the day that
/// is still open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitInterval {
    pub completed: Vec<Track>,
    pub open: Track,
    pub open_start: DateTime<Utc>,
}

pub fn split_interval(
    category: CategoryId,
    start: DateTime<Utc>,
    now: DateTime<Utc>,
    calendar: &Calendar,
) -> Result<SplitInterval, TrackError> {
    let mut segments = partition(calendar, start, now);
    let last = segments.pop().ok_or_else(|| {
        TrackError::InvariantViolation("partition produced no segments".to_string())
    })?;

    let completed = segments
        .iter()
        .map(|segment| segment_track(category, segment, calendar))
        .collect::<Result<Vec<_>, _>>()?;
    let open = segment_track(category, &last, calendar)?;

    Ok(SplitInterval {
        completed,
        open,
        open_start: last.start,
    })
}

fn segment_track(
    category: CategoryId,
    segment: &Segment,
    calendar: &Calendar,
) -> Result<Track, TrackError> {
    let seconds = u32::try_from(segment.seconds()).map_err(|_| {
        TrackError::InvariantViolation(format!(
            "segment on {} has negative length {}s",
            segment.day,
            segment.seconds()
        ))
    })?;

    Track::new(category, segment.day, seconds, calendar).map_err(|err| {
        TrackError::InvariantViolation(format!("partitioned segment rejected: {}", err))
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_track_rejects_duration_longer_than_day() {
        let calendar = Calendar::utc();
        let day = date(2024, 1, 1);

        assert!(Track::new(CategoryId::new(1), day, 86_400, &calendar).is_ok());
        assert_eq!(
            Track::new(CategoryId::new(1), day, 86_401, &calendar),
            Err(TrackError::DurationOutOfRange {
                day,
                duration: 86_401,
                max: 86_400
            })
        );
    }

    #[test]
    fn test_partition_within_one_day() {
        let calendar = Calendar::utc();
        let segments = partition(&calendar, utc(2024, 1, 1, 9, 0, 0), utc(2024, 1, 1, 10, 0, 0));

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].day, date(2024, 1, 1));
        assert_eq!(segments[0].seconds(), 3600);
    }

    #[test]
    fn test_partition_across_midnight() {
        let calendar = Calendar::utc();
        let segments = partition(
            &calendar,
            utc(2024, 1, 1, 23, 0, 0),
            utc(2024, 1, 2, 1, 30, 0),
        );

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].seconds(), 3600);
        assert_eq!(segments[1].day, date(2024, 1, 2));
        assert_eq!(segments[1].start, utc(2024, 1, 2, 0, 0, 0));
        assert_eq!(segments[1].seconds(), 5400);
    }

    #[test]
    fn test_partition_ending_at_midnight_opens_empty_day() {
        let calendar = Calendar::utc();
        let segments = partition(
            &calendar,
            utc(2024, 1, 1, 22, 0, 0),
            utc(2024, 1, 2, 0, 0, 0),
        );

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].seconds(), 7200);
        assert_eq!(segments[1].day, date(2024, 1, 2));
        assert_eq!(segments[1].seconds(), 0);
    }

    #[test]
    fn test_partition_sums_to_interval_and_counts_days() {
        let calendars = [
            Calendar::utc(),
            Calendar::from_offset_seconds(5 * 3600 + 1800).unwrap(),
            Calendar::from_offset_seconds(-8 * 3600).unwrap(),
        ];
        let start = utc(2024, 2, 27, 17, 42, 13);
        let lengths = [0, 1, 3_599, 86_399, 86_400, 200_000, 1_000_003];

        for calendar in &calendars {
            for length in lengths {
                let now = start + chrono::Duration::seconds(length);
                let segments = partition(calendar, start, now);

                let total: i64 = segments.iter().map(Segment::seconds).sum();
                assert_eq!(total, length);

                let days = (calendar.day_of(now) - calendar.day_of(start)).num_days() + 1;
                assert_eq!(segments.len() as i64, days);
            }
        }
    }

    #[test]
    fn test_partition_with_reversed_interval_is_empty_at_now() {
        let calendar = Calendar::utc();
        let now = utc(2024, 1, 1, 8, 0, 0);
        let segments = partition(&calendar, utc(2024, 1, 1, 9, 0, 0), now);

        assert_eq!(
            segments,
            vec![Segment {
                day: date(2024, 1, 1),
                start: now,
                end: now
            }]
        );
    }

    #[test]
    fn test_split_interval_separates_open_day() {
        let calendar = Calendar::utc();
        let work = CategoryId::new(1);
        let split = split_interval(
            work,
            utc(2024, 1, 1, 23, 0, 0),
            utc(2024, 1, 3, 0, 10, 0),
            &calendar,
        )
        .unwrap();

        assert_eq!(
            split.completed,
            vec![
                Track::new(work, date(2024, 1, 1), 3600, &calendar).unwrap(),
                Track::new(work, date(2024, 1, 2), 86_400, &calendar).unwrap(),
            ]
        );
        assert_eq!(split.open, Track::new(work, date(2024, 1, 3), 600, &calendar).unwrap());
        assert_eq!(split.open_start, utc(2024, 1, 3, 0, 0, 0));
    }
}
