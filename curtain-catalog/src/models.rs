use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::scoring::VenueScoring;

fn default_true() -> bool {
    true
}

fn default_floor() -> String {
    "1층".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatGrade {
    pub grade: String,
    pub price: i64,
    pub color: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Explicit seat entry for rows that list their seats instead of a length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatEntry {
    #[serde(default)]
    pub seat_id: Option<String>,
    #[serde(default)]
    pub seat_number: Option<u32>,
}

impl SeatEntry {
    pub fn number(&self) -> Option<u32> {
        self.seat_number.or_else(|| {
            self.seat_id
                .as_deref()
                .and_then(|id| id.rsplit('-').next())
                .and_then(|n| n.parse().ok())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub row_id: String,
    pub grade: String,
    #[serde(default)]
    pub length: Option<u32>,
    #[serde(default)]
    pub seats: Vec<SeatEntry>,
}

impl Row {
    /// Listed seats win over `length`.
    pub fn seat_count(&self) -> u32 {
        if self.seats.is_empty() {
            self.length.unwrap_or(0)
        } else {
            self.seats.len() as u32
        }
    }

    /// Local seat numbers in ascending order.
    pub fn local_numbers(&self) -> Vec<u32> {
        if self.seats.is_empty() {
            return (1..=self.length.unwrap_or(0)).collect();
        }
        let mut numbers: Vec<u32> = self.seats.iter().filter_map(SeatEntry::number).collect();
        numbers.sort_unstable();
        numbers.dedup();
        numbers
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub section_id: String,
    #[serde(default = "default_floor")]
    pub floor: String,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowTime {
    pub time: String,
    #[serde(default)]
    pub schedule_id: Option<String>,
    #[serde(default)]
    pub available_seats: Option<u32>,
    #[serde(default)]
    pub total_seats: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub casting: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub date: NaiveDate,
    #[serde(default)]
    pub day_of_week: Option<String>,
    pub times: Vec<ShowTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Performance {
    pub performance_id: String,
    pub title: String,
    pub venue_id: String,
    pub venue: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub age_rating: Option<String>,
    pub seat_grades: Vec<SeatGrade>,
    /// Empty means "use the venue's sections".
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default = "default_true", rename = "hasOPSeats")]
    pub has_op_seats: bool,
    #[serde(default)]
    pub schedules: Vec<Schedule>,
}

impl Performance {
    pub fn seat_grade(&self, code: &str) -> Option<&SeatGrade> {
        self.seat_grades.iter().find(|g| g.grade == code)
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.schedules.iter().map(|s| s.date).min()?;
        let last = self.schedules.iter().map(|s| s.date).max()?;
        Some((first, last))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Venue {
    pub venue_id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    pub sections: Vec<Section>,
    #[serde(default)]
    pub scoring: Option<VenueScoring>,
}

/// Listing entry for browsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub performance_id: String,
    pub title: String,
    pub venue: String,
    pub date_range: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    #[serde(rename = "hasOPSeats")]
    pub has_op_seats: bool,
}

impl From<&Performance> for PerformanceSummary {
    fn from(p: &Performance) -> Self {
        Self {
            performance_id: p.performance_id.clone(),
            title: p.title.clone(),
            venue: p.venue.clone(),
            date_range: p.date_range().map(|(first, last)| {
                format!("{} ~ {}", first.format("%Y.%m.%d"), last.format("%Y.%m.%d"))
            }),
            min_price: p.seat_grades.iter().map(|g| g.price).min(),
            max_price: p.seat_grades.iter().map(|g| g.price).max(),
            has_op_seats: p.has_op_seats,
        }
    }
}
