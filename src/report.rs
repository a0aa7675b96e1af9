use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    category::{Category, CategoryId, CategoryRegistry, Color},
    error::{Result, StorageError},
    track::Track,
};

pub const EXPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportPeriod {
    Today,
    Week,
    Month,
}

impl ReportPeriod {
    pub fn days(&self) -> i64 {
        match self {
            ReportPeriod::Today => 1,
            ReportPeriod::Week => 7,
            ReportPeriod::Month => 30,
        }
    }

    pub fn first_day(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_signed(ChronoDuration::days(self.days() - 1))
            .unwrap_or(NaiveDate::MIN)
    }

    pub fn title(&self) -> &'static str {
        match self {
            ReportPeriod::Today => "Today's Report",
            ReportPeriod::Week => "Weekly Report",
            ReportPeriod::Month => "Monthly Report",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportEntry {
    pub category_id: CategoryId,
    pub category_name: String,
    pub color: Color,
    pub elapsed_seconds: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportSummary {
    pub period: ReportPeriod,
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
    pub entries: Vec<ReportEntry>,
    pub total_seconds: u64,
}

/// Totals per category over the days of `period` ending at `today`, in
/// registry order. Categories without time in the period are left out.
pub fn build_period_report(
    tracks: &[Track],
    registry: &CategoryRegistry,
    period: ReportPeriod,
    today: NaiveDate,
) -> ReportSummary {
    let first_day = period.first_day(today);
    let totals = tracks
        .iter()
        .filter(|track| track.day() >= first_day && track.day() <= today)
        .into_grouping_map_by(|track| track.category())
        .fold(0u64, |total, _, track| total + u64::from(track.duration()));

    let entries: Vec<ReportEntry> = registry
        .iter()
        .filter_map(|category| {
            let elapsed_seconds = totals.get(&category.id).copied().unwrap_or(0);
            (elapsed_seconds > 0).then(|| ReportEntry {
                category_id: category.id,
                category_name: category.title.clone(),
                color: category.color,
                elapsed_seconds,
            })
        })
        .collect();

    let total_seconds = entries.iter().map(|entry| entry.elapsed_seconds).sum();
    ReportSummary {
        period,
        first_day,
        last_day: today,
        entries,
        total_seconds,
    }
}

pub fn format_duration(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackExport {
    pub date: NaiveDate,
    pub category_id: u64,
    pub category: String,
    pub duration_seconds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataExport {
    pub schema_version: u32,
    pub exported_at: DateTime<Utc>,
    pub categories: Vec<Category>,
    pub tracks: Vec<TrackExport>,
}

fn track_rows(tracks: &[Track], registry: &CategoryRegistry) -> Vec<TrackExport> {
    tracks
        .iter()
        .map(|track| TrackExport {
            date: track.day(),
            category_id: track.category().0,
            category: registry
                .get(track.category())
                .map(|category| category.title.clone())
                .unwrap_or_else(|| "unknown".to_string()),
            duration_seconds: track.duration(),
        })
        .collect()
}

pub fn export_json(
    tracks: &[Track],
    registry: &CategoryRegistry,
    exported_at: DateTime<Utc>,
) -> Result<String> {
    let export = DataExport {
        schema_version: EXPORT_SCHEMA_VERSION,
        exported_at,
        categories: registry.categories().to_vec(),
        tracks: track_rows(tracks, registry),
    };
    let json = serde_json::to_string_pretty(&export).map_err(|source| StorageError::Json {
        key: "export".to_string(),
        source,
    })?;
    Ok(json)
}

pub fn export_csv(tracks: &[Track], registry: &CategoryRegistry) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in track_rows(tracks, registry) {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| std::io::Error::other(err.to_string()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{calendar::Calendar, constants::COLORS};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fixture() -> (CategoryRegistry, Vec<Track>) {
        let mut registry = CategoryRegistry::new();
        for (index, title) in ["Work", "Sleep", "Gym"].iter().enumerate() {
            let category = registry.create(title, COLORS[index]);
            registry.insert(category, index).unwrap();
        }
        let work = registry.find("Work").unwrap().id;
        let sleep = registry.find("Sleep").unwrap().id;
        let calendar = Calendar::utc();

        let tracks = vec![
            Track::new(work, date(2024, 1, 10), 3600, &calendar).unwrap(),
            Track::new(work, date(2024, 1, 5), 1800, &calendar).unwrap(),
            Track::new(sleep, date(2024, 1, 10), 28_800, &calendar).unwrap(),
            Track::new(sleep, date(2023, 12, 1), 30_000, &calendar).unwrap(),
        ];
        (registry, tracks)
    }

    #[test]
    fn test_today_report_only_counts_today() {
        let (registry, tracks) = fixture();
        let summary = build_period_report(&tracks, &registry, ReportPeriod::Today, date(2024, 1, 10));

        assert_eq!(summary.first_day, date(2024, 1, 10));
        assert_eq!(summary.entries.len(), 2);
        assert_eq!(summary.entries[0].category_name, "Work");
        assert_eq!(summary.entries[0].elapsed_seconds, 3600);
        assert_eq!(summary.total_seconds, 3600 + 28_800);
    }

    #[test]
    fn test_week_report_sums_days_and_skips_empty_categories() {
        let (registry, tracks) = fixture();
        let summary = build_period_report(&tracks, &registry, ReportPeriod::Week, date(2024, 1, 10));

        assert_eq!(summary.first_day, date(2024, 1, 4));
        assert_eq!(summary.entries[0].elapsed_seconds, 5400);
        assert!(summary.entries.iter().all(|e| e.category_name != "Gym"));
        assert_eq!(summary.total_seconds, 5400 + 28_800);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00:00");
        assert_eq!(format_duration(5400), "01:30:00");
        assert_eq!(format_duration(100_000), "27:46:40");
    }

    #[test]
    fn test_csv_export_has_header_and_rows() {
        let (registry, tracks) = fixture();
        let csv = export_csv(&tracks[..1], &registry).unwrap();

        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("date,category_id,category,duration_seconds")
        );
        assert_eq!(lines.next(), Some("2024-01-10,1,Work,3600"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_json_export_lists_categories_and_tracks() {
        let (registry, tracks) = fixture();
        let exported_at = Utc.with_ymd_and_hms(2024, 1, 11, 0, 0, 0).unwrap();
        let json = export_json(&tracks, &registry, exported_at).unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["schema_version"], 1);
        assert_eq!(value["categories"].as_array().unwrap().len(), 3);
        assert_eq!(value["tracks"].as_array().unwrap().len(), 4);
        assert_eq!(value["tracks"][0]["date"], "2024-01-10");
    }
}
