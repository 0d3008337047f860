use curtain_catalog::{StageAlignment, VenueScoring, APRON_ROW};

/// Full bonus for a window entirely inside the ideal range of a center block.
const CENTER_FULL_BONUS: f64 = 80.0;
const CENTER_PARTIAL_BASE: f64 = 30.0;
const CENTER_PARTIAL_SPAN: f64 = 40.0;
const PROXIMITY_MAX: f64 = 20.0;
const PROXIMITY_STEP: f64 = 3.0;
const SIDE_MAX: f64 = 60.0;

/// Closer rows score higher. The apron row counts as row 0.
pub fn row_score(row: &str) -> f64 {
    if row == APRON_ROW {
        return 100.0;
    }
    100.0 - row.parse::<f64>().unwrap_or(0.0)
}

/// Position bonus of a window given its display numbers.
pub fn position_bonus(scoring: &VenueScoring, floor: &str, section: &str, row: &str, display: &[u32]) -> f64 {
    let Some(table) = scoring.section_table(floor, section, row) else {
        return 0.0;
    };
    if display.is_empty() {
        return 0.0;
    }
    let average = display.iter().map(|n| *n as f64).sum::<f64>() / display.len() as f64;

    match &table.alignment {
        StageAlignment::Middle {
            ideal_center,
            ideal_start,
            ideal_end,
        } => {
            let inside = display
                .iter()
                .filter(|n| (*ideal_start..=*ideal_end).contains(&(**n as f64)))
                .count();
            let mut bonus = if inside == display.len() {
                CENTER_FULL_BONUS
            } else if inside > 0 {
                CENTER_PARTIAL_BASE + (inside as f64 / display.len() as f64) * CENTER_PARTIAL_SPAN
            } else {
                0.0
            };
            let distance = (average - ideal_center).abs();
            bonus += (PROXIMITY_MAX - distance * PROXIMITY_STEP).max(0.0);
            bonus
        }
        StageAlignment::High => {
            let span = table.max - table.min;
            if span <= 0.0 {
                return 0.0;
            }
            ((average - table.min) / span).clamp(0.0, 1.0) * SIDE_MAX
        }
        StageAlignment::Low => {
            let span = table.max - table.min;
            if span <= 0.0 {
                return 0.0;
            }
            ((table.max - average) / span).clamp(0.0, 1.0) * SIDE_MAX
        }
    }
}

/// Total score of a window of consecutive seats.
pub fn score_window(scoring: &VenueScoring, floor: &str, section: &str, row: &str, display: &[u32]) -> f64 {
    row_score(row)
        + position_bonus(scoring, floor, section, row, display)
        + scoring.section_bonus(section)
        + scoring.floor_bonus(floor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_center_window_scores() {
        let scoring = VenueScoring::charlotte();
        // 18,19: inside [18,21], average 18.5 is 1 from 19.5
        assert!(approx(position_bonus(&scoring, "1층", "B", "1", &[18, 19]), 97.0));
        // 19,20: dead center
        assert!(approx(position_bonus(&scoring, "1층", "B", "1", &[19, 20]), 100.0));
        // 17,18: half inside, average 17.5
        assert!(approx(position_bonus(&scoring, "1층", "B", "1", &[17, 18]), 50.0 + 14.0));
        // outside the range, only the proximity term is left
        assert!(approx(position_bonus(&scoring, "1층", "B", "1", &[13, 14]), 2.0));
    }

    #[test]
    fn test_side_sections_lean_toward_center() {
        let scoring = VenueScoring::charlotte();
        let a_inner = position_bonus(&scoring, "1층", "A", "1", &[11, 12]);
        let a_outer = position_bonus(&scoring, "1층", "A", "1", &[1, 2]);
        assert!(a_inner > a_outer);

        let c_inner = position_bonus(&scoring, "1층", "C", "1", &[27, 28]);
        let c_outer = position_bonus(&scoring, "1층", "C", "1", &[37, 38]);
        assert!(c_inner > c_outer);
        assert!(approx(position_bonus(&scoring, "1층", "C", "1", &[1, 2]), 60.0));
    }

    #[test]
    fn test_total_adds_fixed_bonuses() {
        let scoring = VenueScoring::charlotte();
        let total = score_window(&scoring, "1층", "B", "1", &[19, 20]);
        assert!(approx(total, 99.0 + 100.0 + 15.0 + 20.0));

        let upper = score_window(&scoring, "2층", "D", "2", &[13]);
        assert!(approx(upper, 98.0 + 60.0 + 5.0 + 10.0));
    }

    #[test]
    fn test_apron_uses_its_own_table() {
        let scoring = VenueScoring::charlotte();
        assert!(approx(row_score("OP"), 100.0));
        assert!(approx(position_bonus(&scoring, "1층", "B", "OP", &[6, 7]), 80.0 + 20.0));
    }
}
