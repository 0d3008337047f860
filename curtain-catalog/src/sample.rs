//! Built-in catalog: the Charlotte Theater and a run of Kinky Boots.

use chrono::NaiveDate;

use crate::models::{Performance, Row, Schedule, SeatGrade, Section, ShowTime, Venue};
use crate::repository::CatalogFile;
use crate::schedule::schedule_id_for;

pub const SAMPLE_PERFORMANCE_ID: &str = "perf-kinky-1";
pub const SAMPLE_VENUE_ID: &str = "venue-charlotte";

fn row(row_id: &str, grade: &str, length: u32) -> Row {
    Row {
        row_id: row_id.to_string(),
        grade: grade.to_string(),
        length: Some(length),
        seats: Vec::new(),
    }
}

fn ground_grade(row: u32) -> &'static str {
    match row {
        1..=3 => "VIP",
        4..=7 => "R",
        _ => "S",
    }
}

fn ground_section(section_id: &str, width: u32, apron: bool) -> Section {
    let mut rows = Vec::new();
    if apron {
        rows.push(row("OP", "OP", 12));
    }
    rows.extend((1..=10).map(|n| row(&n.to_string(), ground_grade(n), width)));
    Section {
        section_id: section_id.to_string(),
        floor: "1층".to_string(),
        rows,
    }
}

fn upper_section(section_id: &str) -> Section {
    Section {
        section_id: section_id.to_string(),
        floor: "2층".to_string(),
        rows: (1..=5)
            .map(|n| row(&n.to_string(), if n <= 2 { "S" } else { "A" }, 13))
            .collect(),
    }
}

pub fn charlotte_venue() -> Venue {
    Venue {
        venue_id: SAMPLE_VENUE_ID.to_string(),
        name: "샤롯데씨어터".to_string(),
        address: Some("서울특별시 송파구 올림픽로 240".to_string()),
        sections: vec![
            ground_section("A", 12, false),
            ground_section("B", 14, true),
            ground_section("C", 12, false),
            upper_section("D"),
            upper_section("E"),
            upper_section("F"),
        ],
        scoring: None,
    }
}

fn grade(code: &str, price: i64, color: &str, description: &str) -> SeatGrade {
    SeatGrade {
        grade: code.to_string(),
        price,
        color: color.to_string(),
        description: Some(description.to_string()),
    }
}

pub fn kinky_boots() -> Performance {
    let slots: [(&str, &[&str]); 4] = [
        ("2026-02-10", &["19:30"]),
        ("2026-02-11", &["19:30", "14:00"]),
        ("2026-02-14", &["14:00", "19:00"]),
        ("2026-02-15", &["14:00"]),
    ];

    let schedules = slots
        .iter()
        .filter_map(|(date, times)| {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
            Some(Schedule {
                date,
                day_of_week: None,
                times: times
                    .iter()
                    .map(|time| ShowTime {
                        time: time.to_string(),
                        schedule_id: Some(schedule_id_for(SAMPLE_PERFORMANCE_ID, date, time)),
                        available_seats: None,
                        total_seats: None,
                        status: None,
                        casting: None,
                    })
                    .collect(),
            })
        })
        .collect();

    Performance {
        performance_id: SAMPLE_PERFORMANCE_ID.to_string(),
        title: "킹키부츠".to_string(),
        venue_id: SAMPLE_VENUE_ID.to_string(),
        venue: "샤롯데씨어터".to_string(),
        description: Some("브로드웨이 뮤지컬 킹키부츠".to_string()),
        duration: Some("155분".to_string()),
        age_rating: Some("8세 이상".to_string()),
        seat_grades: vec![
            grade("OP", 170_000, "#8B0000", "무대와 가장 가까운 오케스트라 피트석"),
            grade("VIP", 170_000, "#9B59B6", "무대 정면 앞쪽의 최고 등급 좌석"),
            grade("R", 140_000, "#E74C3C", "시야가 좋은 1층 중간 좌석"),
            grade("S", 110_000, "#3498DB", "1층 뒤쪽과 2층 앞쪽 좌석"),
            grade("A", 80_000, "#2ECC71", "2층 뒤쪽 좌석"),
        ],
        sections: Vec::new(),
        has_op_seats: true,
        schedules,
    }
}

pub fn sample_catalog() -> CatalogFile {
    CatalogFile {
        venues: vec![charlotte_venue()],
        performances: vec![kinky_boots()],
    }
}
