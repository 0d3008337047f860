//! Seat identity and numbering for one venue layout.
//!
//! Storage ids carry the seat's local number inside its row segment. People
//! read a running number across the whole floor: the same row continues from
//! section A through F. The apron row is numbered on its own.

use curtain_core::{
    DisplaySeat, DisplaySeatNumber, EngineError, EngineResult, ResourceKind, StorageSeatId,
};

use crate::grade::APRON_GRADE;
use crate::models::{Row, Section};

/// Row id of the apron row in front of the stage.
pub const APRON_ROW: &str = APRON_GRADE;

/// Order in which a row's segments are numbered.
pub const SECTION_ORDER: [&str; 6] = ["A", "B", "C", "D", "E", "F"];

#[derive(Debug, Clone, Copy)]
pub struct VenueLayout<'a> {
    sections: &'a [Section],
}

impl<'a> VenueLayout<'a> {
    pub fn new(sections: &'a [Section]) -> Self {
        Self { sections }
    }

    pub fn sections(&self) -> &'a [Section] {
        self.sections
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    fn section(&self, floor: &str, section_id: &str) -> Option<&'a Section> {
        self.sections
            .iter()
            .find(|s| s.floor == floor && s.section_id == section_id)
    }

    pub fn row(&self, floor: &str, section_id: &str, row_id: &str) -> Option<&'a Row> {
        self.section(floor, section_id)?
            .rows
            .iter()
            .find(|r| r.row_id == row_id)
    }

    /// Grade of the row holding `seat`.
    pub fn resolve_grade(&self, seat: &StorageSeatId) -> EngineResult<&'a str> {
        self.row(&seat.floor, &seat.section, &seat.row)
            .map(|r| r.grade.as_str())
            .ok_or_else(|| EngineError::not_found(ResourceKind::Seat, seat))
    }

    /// Whether `seat` names a physical seat of this layout.
    pub fn contains(&self, seat: &StorageSeatId) -> bool {
        self.row(&seat.floor, &seat.section, &seat.row)
            .map(|r| r.local_numbers().binary_search(&seat.number).is_ok())
            .unwrap_or(false)
    }

    /// Seats of the same row id in every section preceding `section_id` on `floor`.
    fn offset(&self, floor: &str, section_id: &str, row_id: &str) -> u32 {
        let Some(index) = SECTION_ORDER.iter().position(|s| *s == section_id) else {
            return 0;
        };
        SECTION_ORDER[..index]
            .iter()
            .filter_map(|preceding| self.row(floor, preceding, row_id))
            .map(Row::seat_count)
            .sum()
    }

    pub fn local_to_global(
        &self,
        floor: &str,
        section_id: &str,
        row_id: &str,
        local: u32,
    ) -> DisplaySeatNumber {
        if row_id == APRON_ROW {
            return DisplaySeatNumber(local);
        }
        DisplaySeatNumber(self.offset(floor, section_id, row_id) + local)
    }

    pub fn display_number(&self, seat: &StorageSeatId) -> DisplaySeatNumber {
        self.local_to_global(&seat.floor, &seat.section, &seat.row, seat.number)
    }

    /// Inverse of [`local_to_global`](Self::local_to_global). Without a
    /// section the segment containing the number is searched in numbering
    /// order. `None` unless the number lands on a listed seat of the row.
    pub fn global_to_local(&self, seat: &DisplaySeat) -> Option<StorageSeatId> {
        let display = seat.number.get();
        if display == 0 {
            return None;
        }

        if seat.row == APRON_ROW {
            let section = match &seat.section {
                Some(section) => self.section(&seat.floor, section)?,
                None => self.sections.iter().find(|s| {
                    s.floor == seat.floor && s.rows.iter().any(|r| r.row_id == APRON_ROW)
                })?,
            };
            let candidate = StorageSeatId::new(&seat.floor, &section.section_id, APRON_ROW, display);
            return self.contains(&candidate).then_some(candidate);
        }

        let candidates: Vec<&str> = match &seat.section {
            Some(section) => vec![section.as_str()],
            None => SECTION_ORDER.to_vec(),
        };

        candidates.into_iter().find_map(|section_id| {
            self.row(&seat.floor, section_id, &seat.row)?;
            let offset = self.offset(&seat.floor, section_id, &seat.row);
            // Rows may list seats with gaps, so the local number can exceed the count.
            let local = display.checked_sub(offset).filter(|n| *n > 0)?;
            let candidate = StorageSeatId::new(&seat.floor, section_id, &seat.row, local);
            self.contains(&candidate).then_some(candidate)
        })
    }

    /// Every seat of the layout, in layout order.
    pub fn seat_universe(&self) -> Vec<StorageSeatId> {
        self.sections
            .iter()
            .flat_map(|section| {
                section.rows.iter().flat_map(move |row| {
                    row.local_numbers().into_iter().map(move |n| {
                        StorageSeatId::new(&section.floor, &section.section_id, &row.row_id, n)
                    })
                })
            })
            .collect()
    }

    /// Reading of a storage id whose "local" number is really a display number.
    /// Used to explain rejected ids such as `1층-B-1-19`.
    pub fn display_reading(&self, seat: &StorageSeatId) -> Option<StorageSeatId> {
        let display = DisplaySeat {
            floor: seat.floor.clone(),
            section: None,
            row: seat.row.clone(),
            number: DisplaySeatNumber(seat.number),
        };
        self.global_to_local(&display)
    }

    /// `"18~19"` style range of display numbers for a row window.
    pub fn display_range(&self, seats: &[StorageSeatId]) -> String {
        let mut numbers: Vec<u32> = seats.iter().map(|s| self.display_number(s).get()).collect();
        numbers.sort_unstable();
        match (numbers.first(), numbers.last()) {
            (Some(first), Some(last)) if first != last => format!("{}~{}", first, last),
            (Some(first), _) => first.to_string(),
            _ => String::new(),
        }
    }
}
