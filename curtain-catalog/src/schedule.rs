use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::models::Performance;

pub const DEFAULT_SCHEDULE_LIMIT: usize = 10;
pub const MAX_SCHEDULE_LIMIT: usize = 30;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleQuery {
    #[serde(default)]
    pub from_date: Option<NaiveDate>,
    #[serde(default)]
    pub prefer_weekend: bool,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSlot {
    pub schedule_id: String,
    pub performance_id: String,
    pub date: NaiveDate,
    pub formatted_date: String,
    pub time: String,
    pub time_label: String,
    pub datetime: String,
    pub day_of_week: String,
    pub status: String,
    pub available_seats: Option<u32>,
    pub total_seats: Option<u32>,
    pub casting: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleListing {
    pub schedules: Vec<ScheduleSlot>,
    /// Matching slots before the limit was applied.
    pub count: usize,
    pub has_more: bool,
}

pub fn korean_weekday(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Mon => "월",
        Weekday::Tue => "화",
        Weekday::Wed => "수",
        Weekday::Thu => "목",
        Weekday::Fri => "금",
        Weekday::Sat => "토",
        Weekday::Sun => "일",
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn time_label(time: &str) -> String {
    let hour = NaiveTime::parse_from_str(time, "%H:%M")
        .map(|t| t.hour())
        .unwrap_or(0);
    let label = match hour {
        10..=14 => "마티네",
        17..=21 => "소야",
        _ => "평일",
    };
    format!("{} ({})", label, time)
}

pub fn schedule_id_for(performance_id: &str, date: NaiveDate, time: &str) -> String {
    format!("{}-{}-{}", performance_id, date.format("%Y-%m-%d"), time)
}

/// Upcoming slots of a performance, one entry per show time, ordered by date
/// then time.
pub fn list_schedules(performance: &Performance, query: &ScheduleQuery, today: NaiveDate) -> ScheduleListing {
    let from = query.from_date.unwrap_or(today);
    let limit = query
        .limit
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_SCHEDULE_LIMIT)
        .min(MAX_SCHEDULE_LIMIT);

    let mut days: Vec<_> = performance.schedules.iter().filter(|s| s.date >= from).collect();
    days.sort_by_key(|s| s.date);

    let mut slots: Vec<ScheduleSlot> = Vec::new();
    for day in days {
        let mut times: Vec<_> = day.times.iter().collect();
        times.sort_by(|a, b| a.time.cmp(&b.time));
        let day_of_week = day
            .day_of_week
            .clone()
            .unwrap_or_else(|| korean_weekday(day.date).to_string());

        for show in times {
            slots.push(ScheduleSlot {
                schedule_id: show
                    .schedule_id
                    .clone()
                    .unwrap_or_else(|| schedule_id_for(&performance.performance_id, day.date, &show.time)),
                performance_id: performance.performance_id.clone(),
                date: day.date,
                formatted_date: format!(
                    "{}년 {}월 {}일 ({})",
                    day.date.year(),
                    day.date.month(),
                    day.date.day(),
                    day_of_week
                ),
                time: show.time.clone(),
                time_label: time_label(&show.time),
                datetime: format!("{}T{}:00", day.date.format("%Y-%m-%d"), show.time),
                day_of_week: day_of_week.clone(),
                status: show.status.clone().unwrap_or_else(|| "AVAILABLE".to_string()),
                available_seats: show.available_seats,
                total_seats: show.total_seats,
                casting: show.casting.clone(),
            });
        }
    }

    if query.prefer_weekend && slots.iter().any(|s| is_weekend(s.date)) {
        slots.retain(|s| is_weekend(s.date));
    }

    let count = slots.len();
    slots.truncate(limit);

    ScheduleListing {
        schedules: slots,
        count,
        has_more: count > limit,
    }
}

/// Date and time encoded in a schedule id.
///
/// Accepts `{performanceId}-YYYY-MM-DD-HH:MM` and the older
/// `sch-{name}-YYYYMMDD-HHMM`.
pub fn parse_schedule_id(schedule_id: &str) -> Option<(NaiveDate, String)> {
    let parts: Vec<&str> = schedule_id.trim().split('-').collect();
    if parts.len() < 4 {
        return None;
    }
    let last = parts[parts.len() - 1];

    if last.contains(':') && parts.len() >= 5 {
        let raw_date = parts[parts.len() - 4..parts.len() - 1].join("-");
        let date = NaiveDate::parse_from_str(&raw_date, "%Y-%m-%d").ok()?;
        let time = NaiveTime::parse_from_str(last, "%H:%M").ok()?;
        return Some((date, time.format("%H:%M").to_string()));
    }

    let raw_date = parts[parts.len() - 2];
    if raw_date.len() == 8 && last.len() == 4 {
        let date = NaiveDate::parse_from_str(raw_date, "%Y%m%d").ok()?;
        let time = NaiveTime::parse_from_str(last, "%H%M").ok()?;
        return Some((date, time.format("%H:%M").to_string()));
    }

    None
}

/// Slot named by `schedule_id`: catalog entries first, then the id itself.
pub fn resolve_schedule(performance: &Performance, schedule_id: &str) -> Option<(NaiveDate, String)> {
    let listed = performance.schedules.iter().find_map(|day| {
        day.times
            .iter()
            .find(|t| t.schedule_id.as_deref() == Some(schedule_id))
            .map(|t| (day.date, t.time.clone()))
    });
    listed.or_else(|| parse_schedule_id(schedule_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_parse_both_id_formats() {
        assert_eq!(
            parse_schedule_id("perf-kinky-1-2026-02-10-19:30"),
            Some((date("2026-02-10"), "19:30".to_string()))
        );
        assert_eq!(
            parse_schedule_id("sch-kinky-20260210-1930"),
            Some((date("2026-02-10"), "19:30".to_string()))
        );
        assert_eq!(parse_schedule_id("perf-kinky-1"), None);
        assert_eq!(parse_schedule_id("perf-kinky-1-2026-13-40-19:30"), None);
    }

    #[test]
    fn test_listing_is_ordered_and_limited() {
        let perf = sample::kinky_boots();
        let query = ScheduleQuery { limit: Some(2), ..Default::default() };
        let listing = list_schedules(&perf, &query, date("2026-02-01"));

        assert_eq!(listing.schedules.len(), 2);
        assert!(listing.has_more);
        assert_eq!(listing.count, 6);
        assert_eq!(listing.schedules[0].schedule_id, "perf-kinky-1-2026-02-10-19:30");
        assert_eq!(listing.schedules[0].day_of_week, "화");
        assert_eq!(listing.schedules[1].time, "14:00");
    }

    #[test]
    fn test_from_date_and_weekend_preference() {
        let perf = sample::kinky_boots();
        let query = ScheduleQuery {
            from_date: Some(date("2026-02-11")),
            prefer_weekend: true,
            limit: Some(100),
        };
        let listing = list_schedules(&perf, &query, date("2026-01-01"));

        assert_eq!(listing.count, 3);
        assert!(listing.schedules.iter().all(|s| s.day_of_week == "토" || s.day_of_week == "일"));
        assert!(!listing.has_more);
    }

    #[test]
    fn test_limit_is_capped() {
        let perf = sample::kinky_boots();
        let query = ScheduleQuery { limit: Some(500), ..Default::default() };
        let listing = list_schedules(&perf, &query, date("2026-01-01"));
        assert!(listing.schedules.len() <= MAX_SCHEDULE_LIMIT);
    }

    #[test]
    fn test_resolve_prefers_catalog_entry() {
        let perf = sample::kinky_boots();
        assert_eq!(
            resolve_schedule(&perf, "perf-kinky-1-2026-02-14-14:00"),
            Some((date("2026-02-14"), "14:00".to_string()))
        );
        assert_eq!(
            resolve_schedule(&perf, "sch-kinky-20260301-1930"),
            Some((date("2026-03-01"), "19:30".to_string()))
        );
    }
}
