use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use curtain_catalog::{
    grade_rank, normalize_grade, CatalogRepository, Performance, StageAlignment, VenueLayout,
    VenueScoring, APRON_ROW,
};
use curtain_core::{
    DisplaySeatNumber, EngineError, EngineResult, ResourceKind, SeatStatus, SlotKey,
    StorageSeatId, ValidationError,
};

use crate::availability::{AvailabilityProjector, SeatStatusMap};
use crate::scoring::score_window;

pub const DEFAULT_MAX_PARTY_SIZE: u32 = 4;

#[derive(Debug, Clone)]
pub struct RecommendRequest {
    pub slot: SlotKey,
    pub grade: Option<String>,
    pub party_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSummary {
    pub grade: String,
    pub price: i64,
    pub formatted_price: String,
    /// Available seats of this grade.
    pub count: usize,
}

/// A block of consecutive seats offered to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatOption {
    /// Storage ids to pass to the hold operation unchanged.
    pub seat_ids: Vec<StorageSeatId>,
    /// Numbers printed on the seats, for people.
    pub display_numbers: Vec<DisplaySeatNumber>,
    pub label: String,
    pub description: String,
    pub score: f64,
    pub floor: String,
    pub section: String,
    pub row: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRecommendation {
    pub grade: String,
    /// Qualifying windows before selection.
    pub option_count: usize,
    pub options: Vec<SeatOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatAvailability {
    pub performance_id: String,
    pub date: String,
    pub time: String,
    pub party_size: u32,
    pub total_available: usize,
    pub summary: String,
    pub grades: Vec<GradeSummary>,
    pub recommended_options: Vec<GradeRecommendation>,
    pub total_option_count: usize,
}

pub fn validate_party_size(requested: Option<u32>, max: u32) -> Result<u32, ValidationError> {
    match requested {
        None | Some(0) => Err(ValidationError::MissingPartySize),
        Some(n) if n > max => Err(ValidationError::PartySizeExceeded { requested: n, max }),
        Some(n) => Ok(n),
    }
}

pub fn format_won(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if amount < 0 {
        grouped.insert(0, '-');
    }
    format!("{}원", grouped)
}

// ============================================================================
// Recommender
// ============================================================================

#[derive(Clone)]
pub struct SeatRecommender {
    catalog: Arc<dyn CatalogRepository>,
    projector: AvailabilityProjector,
    max_party_size: u32,
}

impl SeatRecommender {
    pub fn new(catalog: Arc<dyn CatalogRepository>, projector: AvailabilityProjector, max_party_size: u32) -> Self {
        Self {
            catalog,
            projector,
            max_party_size,
        }
    }

    pub async fn recommend(&self, request: &RecommendRequest) -> EngineResult<SeatAvailability> {
        let party_size = validate_party_size(request.party_size, self.max_party_size)?;

        let performance = self
            .catalog
            .get_performance(&request.slot.performance_id)
            .await?
            .ok_or_else(|| EngineError::not_found(ResourceKind::Performance, &request.slot.performance_id))?;
        let scoring = self.catalog.scoring_for(&performance.venue_id).await?;
        let status = self.projector.status_map_for(&performance, &request.slot).await?;

        let availability = build_availability(
            &performance,
            &scoring,
            &request.slot,
            &status,
            request.grade.as_deref(),
            party_size,
        );
        debug!(
            performance_id = %request.slot.performance_id,
            total_available = availability.total_available,
            options = availability.total_option_count,
            "seat recommendation computed"
        );
        Ok(availability)
    }
}

// ============================================================================
// Pure recommendation core
// ============================================================================

struct RowSeats<'a> {
    floor: &'a str,
    section: &'a str,
    row: &'a str,
    numbers: Vec<u32>,
}

struct GradeBucket<'a> {
    grade: &'a str,
    count: usize,
    rows: Vec<RowSeats<'a>>,
}

struct Candidate<'a> {
    floor: &'a str,
    section: &'a str,
    row: &'a str,
    locals: Vec<u32>,
    display: Vec<u32>,
    score: f64,
}

/// Available seats bucketed by grade, in layout order.
fn bucket_available<'a>(performance: &'a Performance, status: &SeatStatusMap) -> Vec<GradeBucket<'a>> {
    let mut buckets: Vec<GradeBucket<'a>> = Vec::new();

    for section in &performance.sections {
        for row in &section.rows {
            if row.row_id == APRON_ROW && !performance.has_op_seats {
                continue;
            }
            let numbers: Vec<u32> = row
                .local_numbers()
                .into_iter()
                .filter(|n| {
                    let id = StorageSeatId::new(&section.floor, &section.section_id, &row.row_id, *n);
                    status.get(&id).copied().unwrap_or(SeatStatus::Available) == SeatStatus::Available
                })
                .collect();
            if numbers.is_empty() {
                continue;
            }

            let index = match buckets.iter().position(|b| b.grade == row.grade) {
                Some(i) => i,
                None => {
                    buckets.push(GradeBucket {
                        grade: &row.grade,
                        count: 0,
                        rows: Vec::new(),
                    });
                    buckets.len() - 1
                }
            };
            let bucket = &mut buckets[index];
            bucket.count += numbers.len();
            bucket.rows.push(RowSeats {
                floor: &section.floor,
                section: &section.section_id,
                row: &row.row_id,
                numbers,
            });
        }
    }

    buckets.sort_by_key(|b| grade_rank(b.grade));
    buckets
}

fn enumerate_windows<'a>(
    bucket: &GradeBucket<'a>,
    layout: &VenueLayout<'_>,
    scoring: &VenueScoring,
    party_size: usize,
) -> Vec<Candidate<'a>> {
    let mut candidates = Vec::new();
    if party_size == 0 {
        return candidates;
    }
    for row in &bucket.rows {
        if row.numbers.len() < party_size {
            continue;
        }
        for window in row.numbers.windows(party_size) {
            let consecutive = window.windows(2).all(|pair| pair[1] == pair[0] + 1);
            if !consecutive {
                continue;
            }
            let display: Vec<u32> = window
                .iter()
                .map(|n| layout.local_to_global(row.floor, row.section, row.row, *n).get())
                .collect();
            let score = score_window(scoring, row.floor, row.section, row.row, &display);
            candidates.push(Candidate {
                floor: row.floor,
                section: row.section,
                row: row.row,
                locals: window.to_vec(),
                display,
                score,
            });
        }
    }
    // Stable: ties keep enumeration order.
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    candidates
}

/// Best window of each distinct section first, then the best of the rest.
fn select<'c, 'a>(candidates: &'c [Candidate<'a>], scoring: &VenueScoring) -> Vec<&'c Candidate<'a>> {
    let max = scoring.max_options;
    let mut section_bests: Vec<&Candidate<'a>> = Vec::new();
    let mut seen_sections = HashSet::new();
    for candidate in candidates {
        if seen_sections.insert((candidate.floor, candidate.section)) {
            section_bests.push(candidate);
        }
    }
    section_bests.sort_by_key(|c| {
        scoring
            .preferred_sections
            .iter()
            .position(|s| s == c.section)
            .unwrap_or(usize::MAX)
    });

    let mut chosen: Vec<&Candidate<'a>> = Vec::new();
    let mut used_starts = HashSet::new();
    for candidate in section_bests.into_iter().chain(candidates.iter()) {
        if chosen.len() >= max {
            break;
        }
        let start = (candidate.floor, candidate.section, candidate.row, candidate.locals[0]);
        if used_starts.insert(start) {
            chosen.push(candidate);
        }
    }
    chosen
}

fn describe(candidate: &Candidate<'_>, performance: &Performance, scoring: &VenueScoring, grade: &str) -> String {
    let position = performance
        .seat_grade(grade)
        .and_then(|g| g.description.clone())
        .unwrap_or_else(|| {
            if candidate.row == APRON_ROW {
                return "무대와 가장 가까운 오케스트라 피트석".to_string();
            }
            match candidate.row.parse::<u32>() {
                Ok(n) if n <= 5 => "무대와 매우 가까운 앞쪽".to_string(),
                Ok(n) if n <= 10 => "시야가 좋은 중간 쪽".to_string(),
                _ => "전체적인 무대 감상이 좋은 뒤쪽".to_string(),
            }
        });

    let table = scoring.section_table(candidate.floor, candidate.section, candidate.row);
    let block = match table.map(|t| &t.alignment) {
        Some(StageAlignment::Middle { ideal_start, ideal_end, .. }) => {
            let centered = candidate
                .display
                .iter()
                .any(|n| (*ideal_start..=*ideal_end).contains(&(*n as f64)));
            if centered {
                format!("정중앙({}~{}번) 무대 정면 최고의 명당입니다", ideal_start, ideal_end)
            } else {
                format!("정중앙 블록({})으로 무대 정면 시야가 매우 우수합니다", candidate.section)
            }
        }
        Some(StageAlignment::High) => {
            format!("좌측 블록({}) 통로 쪽이라 이동이 편하고 시야가 트여있습니다", candidate.section)
        }
        Some(StageAlignment::Low) => {
            format!("우측 블록({}) 통로 쪽이라 이동이 편하고 시야가 트여있습니다", candidate.section)
        }
        None => format!("{}구역 좌석입니다", candidate.section),
    };

    format!("{}, {}", position, block)
}

fn to_option(
    candidate: &Candidate<'_>,
    performance: &Performance,
    layout: &VenueLayout<'_>,
    scoring: &VenueScoring,
    grade: &str,
) -> SeatOption {
    let seat_ids: Vec<StorageSeatId> = candidate
        .locals
        .iter()
        .map(|n| StorageSeatId::new(candidate.floor, candidate.section, candidate.row, *n))
        .collect();
    let label = format!(
        "{} {}구역 {}석 {}열 {}번",
        candidate.floor,
        candidate.section,
        grade,
        candidate.row,
        layout.display_range(&seat_ids)
    );

    SeatOption {
        display_numbers: candidate.display.iter().map(|n| DisplaySeatNumber(*n)).collect(),
        label,
        description: describe(candidate, performance, scoring, grade),
        score: candidate.score,
        floor: candidate.floor.to_string(),
        section: candidate.section.to_string(),
        row: candidate.row.to_string(),
        seat_ids,
    }
}

/// Availability summary and recommended blocks for one slot.
///
/// Counts cover every grade; recommendations are limited to the requested
/// grade when one is given. Grades are matched by canonical code, so the
/// apron grade never stands in for another grade. An empty party gets counts
/// but no recommendations.
pub fn build_availability(
    performance: &Performance,
    scoring: &VenueScoring,
    slot: &SlotKey,
    status: &SeatStatusMap,
    grade: Option<&str>,
    party_size: u32,
) -> SeatAvailability {
    let layout = VenueLayout::new(&performance.sections);
    let buckets = bucket_available(performance, status);
    let target = grade.map(normalize_grade);

    let grades: Vec<GradeSummary> = buckets
        .iter()
        .map(|b| {
            let price = performance.seat_grade(b.grade).map(|g| g.price).unwrap_or(0);
            GradeSummary {
                grade: b.grade.to_string(),
                price,
                formatted_price: format_won(price),
                count: b.count,
            }
        })
        .collect();

    let mut recommended_options = Vec::new();
    let mut total_option_count = 0;
    for bucket in &buckets {
        if let Some(target) = &target {
            if normalize_grade(bucket.grade) != *target {
                continue;
            }
        }
        let candidates = enumerate_windows(bucket, &layout, scoring, party_size as usize);
        total_option_count += candidates.len();
        if candidates.is_empty() {
            continue;
        }
        let options = select(&candidates, scoring)
            .into_iter()
            .map(|c| to_option(c, performance, &layout, scoring, bucket.grade))
            .collect();
        recommended_options.push(GradeRecommendation {
            grade: bucket.grade.to_string(),
            option_count: candidates.len(),
            options,
        });
    }

    let summary = grades
        .iter()
        .map(|g| format!("{}석 {} ({}석)", g.grade, g.formatted_price, g.count))
        .collect::<Vec<_>>()
        .join(", ");

    SeatAvailability {
        performance_id: performance.performance_id.clone(),
        date: slot.date_string(),
        time: slot.time.clone(),
        party_size,
        total_available: grades.iter().map(|g| g.count).sum(),
        summary,
        grades,
        recommended_options,
        total_option_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curtain_catalog::sample;

    fn slot() -> SlotKey {
        SlotKey::new("perf-kinky-1", "2026-02-10", "19:30").unwrap()
    }

    fn setup() -> (Performance, VenueScoring) {
        let mut perf = sample::kinky_boots();
        perf.sections = sample::charlotte_venue().sections;
        (perf, VenueScoring::charlotte())
    }

    fn mark(status: &mut SeatStatusMap, ids: &[&str], state: SeatStatus) {
        for id in ids {
            status.insert(id.parse().unwrap(), state);
        }
    }

    #[test]
    fn test_party_size_validation() {
        assert_eq!(validate_party_size(None, 4), Err(ValidationError::MissingPartySize));
        assert_eq!(validate_party_size(Some(0), 4), Err(ValidationError::MissingPartySize));
        assert_eq!(
            validate_party_size(Some(5), 4),
            Err(ValidationError::PartySizeExceeded { requested: 5, max: 4 })
        );
        assert_eq!(validate_party_size(Some(2), 4), Ok(2));
    }

    #[test]
    fn test_format_won() {
        assert_eq!(format_won(170_000), "170,000원");
        assert_eq!(format_won(800), "800원");
        assert_eq!(format_won(1_234_567), "1,234,567원");
    }

    #[test]
    fn test_vip_pair_prefers_center_block() {
        let (perf, scoring) = setup();
        let result = build_availability(&perf, &scoring, &slot(), &SeatStatusMap::new(), Some("vip석"), 2);

        assert_eq!(result.recommended_options.len(), 1);
        let vip = &result.recommended_options[0];
        assert_eq!(vip.grade, "VIP");
        assert_eq!(vip.options.len(), 3);

        let best = &vip.options[0];
        assert_eq!(best.section, "B");
        assert_eq!(best.row, "1");
        assert_eq!(best.seat_ids[0].to_string(), "1층-B-1-7");
        assert_eq!(best.label, "1층 B구역 VIP석 1열 19~20번");

        let sections: Vec<&str> = vip.options.iter().map(|o| o.section.as_str()).collect();
        assert_eq!(sections, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_label_uses_display_numbers_and_ids_stay_local() {
        let (perf, scoring) = setup();
        let mut status = SeatStatusMap::new();
        // Leave only 6 and 7 free among the VIP rows of B.
        for row in 1..=3 {
            for n in 1..=14 {
                if row == 1 && (n == 6 || n == 7) {
                    continue;
                }
                mark(&mut status, &[&format!("1층-B-{}-{}", row, n)], SeatStatus::Reserved);
            }
        }
        let result = build_availability(&perf, &scoring, &slot(), &status, Some("VIP"), 2);
        let labels: Vec<&SeatOption> = result.recommended_options[0]
            .options
            .iter()
            .filter(|o| o.row == "1" && o.section == "B")
            .collect();

        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].label, "1층 B구역 VIP석 1열 18~19번");
        let ids: Vec<String> = labels[0].seat_ids.iter().map(|s| s.to_string()).collect();
        assert_eq!(ids, vec!["1층-B-1-6", "1층-B-1-7"]);
        assert_eq!(labels[0].display_numbers, vec![DisplaySeatNumber(18), DisplaySeatNumber(19)]);
    }

    #[test]
    fn test_vip_never_returns_apron_even_at_equal_price() {
        let (perf, scoring) = setup();
        assert_eq!(perf.seat_grade("OP").unwrap().price, perf.seat_grade("VIP").unwrap().price);

        let result = build_availability(&perf, &scoring, &slot(), &SeatStatusMap::new(), Some("VIP"), 2);
        for rec in &result.recommended_options {
            assert_eq!(rec.grade, "VIP");
            assert!(rec.options.iter().all(|o| o.row != "OP"));
        }

        let apron = build_availability(&perf, &scoring, &slot(), &SeatStatusMap::new(), Some("최전방"), 2);
        assert_eq!(apron.recommended_options[0].grade, "OP");
        assert!(apron.recommended_options[0].options.iter().all(|o| o.row == "OP"));
    }

    #[test]
    fn test_apron_switch_removes_row() {
        let (mut perf, scoring) = setup();
        perf.has_op_seats = false;
        let result = build_availability(&perf, &scoring, &slot(), &SeatStatusMap::new(), None, 2);
        assert!(result.grades.iter().all(|g| g.grade != "OP"));
        assert!(result.recommended_options.iter().all(|r| r.grade != "OP"));
    }

    #[test]
    fn test_counts_exclude_taken_seats() {
        let (perf, scoring) = setup();
        let mut status = SeatStatusMap::new();
        mark(&mut status, &["1층-B-1-6"], SeatStatus::Holding);
        mark(&mut status, &["1층-B-1-7"], SeatStatus::Reserved);

        let free = build_availability(&perf, &scoring, &slot(), &SeatStatusMap::new(), None, 1);
        let taken = build_availability(&perf, &scoring, &slot(), &status, None, 1);
        assert_eq!(free.total_available, 587);
        assert_eq!(taken.total_available, 585);

        let order: Vec<&str> = taken.grades.iter().map(|g| g.grade.as_str()).collect();
        assert_eq!(order, vec!["OP", "VIP", "R", "S", "A"]);
    }

    #[test]
    fn test_grade_without_room_is_omitted() {
        let (perf, scoring) = setup();
        let mut status = SeatStatusMap::new();
        // Every other apron seat taken: no pair left.
        for n in (1..=12).step_by(2) {
            mark(&mut status, &[&format!("1층-B-OP-{}", n)], SeatStatus::Reserved);
        }
        let result = build_availability(&perf, &scoring, &slot(), &status, Some("OP"), 2);
        assert!(result.recommended_options.is_empty());
        assert_eq!(result.total_option_count, 0);
        assert_eq!(result.grades[0].grade, "OP");
        assert_eq!(result.grades[0].count, 6);
    }

    #[test]
    fn test_empty_party_gets_counts_only() {
        let (perf, scoring) = setup();
        let result = build_availability(&perf, &scoring, &slot(), &SeatStatusMap::new(), None, 0);
        assert_eq!(result.total_available, 587);
        assert!(result.recommended_options.is_empty());
        assert_eq!(result.total_option_count, 0);
    }

    #[test]
    fn test_fill_skips_used_start_seats() {
        let (perf, scoring) = setup();
        let mut status = SeatStatusMap::new();
        // Only section B has VIP room left.
        for section in ["A", "C"] {
            for row in 1..=3 {
                for n in 1..=12 {
                    mark(&mut status, &[&format!("1층-{}-{}-{}", section, row, n)], SeatStatus::Reserved);
                }
            }
        }
        let result = build_availability(&perf, &scoring, &slot(), &status, Some("VIP"), 3);
        let options = &result.recommended_options[0].options;
        assert_eq!(options.len(), 3);
        let starts: HashSet<String> = options.iter().map(|o| o.seat_ids[0].to_string()).collect();
        assert_eq!(starts.len(), 3);
        assert!(options.iter().all(|o| o.section == "B"));
    }
}
