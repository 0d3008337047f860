use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::layout::APRON_ROW;

/// Which part of a section faces the stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageAlignment {
    /// Center block: best around `ideal_center`.
    Middle {
        ideal_center: f64,
        ideal_start: f64,
        ideal_end: f64,
    },
    /// Higher display numbers are closer to center.
    High,
    /// Lower display numbers are closer to center.
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionScoring {
    /// Display-number span of the section.
    pub min: f64,
    pub max: f64,
    pub alignment: StageAlignment,
}

impl SectionScoring {
    pub fn middle(min: f64, max: f64, ideal_center: f64, ideal_start: f64, ideal_end: f64) -> Self {
        Self {
            min,
            max,
            alignment: StageAlignment::Middle {
                ideal_center,
                ideal_start,
                ideal_end,
            },
        }
    }

    pub fn side(min: f64, max: f64, alignment: StageAlignment) -> Self {
        Self { min, max, alignment }
    }
}

/// Per-venue scoring tables for seat recommendations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VenueScoring {
    /// floor -> section -> table
    pub floors: BTreeMap<String, BTreeMap<String, SectionScoring>>,
    /// Floor used when a seat's floor has no table.
    pub fallback_floor: String,
    /// Section that owns the apron row and the table used for it.
    pub apron_section: Option<String>,
    pub apron: Option<SectionScoring>,
    pub center_sections: Vec<String>,
    pub center_section_bonus: f64,
    pub side_section_bonus: f64,
    pub floor_bonus: BTreeMap<String, f64>,
    /// Sections whose best window is offered first, in this order.
    pub preferred_sections: Vec<String>,
    pub max_options: usize,
}

impl VenueScoring {
    /// Tables for the Charlotte Theater layout.
    pub fn charlotte() -> Self {
        let mut ground = BTreeMap::new();
        ground.insert("A".to_string(), SectionScoring::side(1.0, 12.0, StageAlignment::High));
        ground.insert("B".to_string(), SectionScoring::middle(13.0, 26.0, 19.5, 18.0, 21.0));
        ground.insert("C".to_string(), SectionScoring::side(27.0, 38.0, StageAlignment::Low));

        let mut upper = BTreeMap::new();
        upper.insert("D".to_string(), SectionScoring::side(1.0, 13.0, StageAlignment::High));
        upper.insert("E".to_string(), SectionScoring::middle(14.0, 26.0, 20.0, 18.0, 21.0));
        upper.insert("F".to_string(), SectionScoring::side(27.0, 39.0, StageAlignment::Low));

        let mut floors = BTreeMap::new();
        floors.insert("1층".to_string(), ground);
        floors.insert("2층".to_string(), upper);

        let mut floor_bonus = BTreeMap::new();
        floor_bonus.insert("1층".to_string(), 20.0);
        floor_bonus.insert("2층".to_string(), 10.0);

        Self {
            floors,
            fallback_floor: "1층".to_string(),
            apron_section: Some("B".to_string()),
            apron: Some(SectionScoring::middle(1.0, 12.0, 6.5, 5.0, 8.0)),
            center_sections: vec!["B".to_string(), "E".to_string()],
            center_section_bonus: 15.0,
            side_section_bonus: 5.0,
            floor_bonus,
            preferred_sections: vec!["B".to_string(), "A".to_string(), "C".to_string()],
            max_options: 3,
        }
    }

    /// Table for a row segment; the apron row has its own.
    pub fn section_table(&self, floor: &str, section: &str, row: &str) -> Option<&SectionScoring> {
        if row == APRON_ROW && self.apron_section.as_deref() == Some(section) {
            if let Some(apron) = &self.apron {
                return Some(apron);
            }
        }
        self.floors
            .get(floor)
            .or_else(|| self.floors.get(&self.fallback_floor))?
            .get(section)
    }

    pub fn section_bonus(&self, section: &str) -> f64 {
        if self.center_sections.iter().any(|s| s == section) {
            self.center_section_bonus
        } else {
            self.side_section_bonus
        }
    }

    pub fn floor_bonus(&self, floor: &str) -> f64 {
        self.floor_bonus.get(floor).copied().unwrap_or(0.0)
    }

    pub fn is_center_section(&self, section: &str) -> bool {
        self.center_sections.iter().any(|s| s == section)
    }
}

impl Default for VenueScoring {
    fn default() -> Self {
        Self::charlotte()
    }
}
