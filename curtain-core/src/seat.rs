use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ValidationError;

/// Floors whose sections are addressed without a floor prefix in legacy ids.
const GROUND_FLOOR: &str = "1층";
const UPPER_FLOOR: &str = "2층";
const GROUND_FLOOR_SECTIONS: [&str; 4] = ["A", "B", "C", "OP"];

/// Seat key as persisted: floor, section, row and the seat's local number
/// within its row (`1층-B-1-6`).
///
/// This is the only seat reference the holding path accepts. Human-facing
/// theater-wide numbers are [`DisplaySeatNumber`]s and must be converted
/// through the venue layout first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorageSeatId {
    pub floor: String,
    pub section: String,
    pub row: String,
    pub number: u32,
}

impl StorageSeatId {
    pub fn new(floor: &str, section: &str, row: &str, number: u32) -> Self {
        Self {
            floor: floor.to_string(),
            section: section.to_string(),
            row: row.to_string(),
            number,
        }
    }

    /// `(floor, section, row)` grouping key.
    pub fn row_key(&self) -> (&str, &str, &str) {
        (&self.floor, &self.section, &self.row)
    }
}

impl fmt::Display for StorageSeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}-{}", self.floor, self.section, self.row, self.number)
    }
}

impl FromStr for StorageSeatId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ValidationError::MalformedSeatId(s.to_string());
        let parts: Vec<&str> = s.trim().split('-').collect();

        let (floor, section, row, number) = match parts.as_slice() {
            [floor, section, row, number] => (floor.to_string(), *section, *row, *number),
            // Legacy ids carry no floor; the section implies it.
            [section, row, number] => {
                let floor = if GROUND_FLOOR_SECTIONS.contains(section) {
                    GROUND_FLOOR
                } else {
                    UPPER_FLOOR
                };
                (floor.to_string(), *section, *row, *number)
            }
            _ => return Err(malformed()),
        };

        if floor.is_empty() || section.is_empty() || row.is_empty() {
            return Err(malformed());
        }
        let number: u32 = number.parse().map_err(|_| malformed())?;
        if number == 0 {
            return Err(malformed());
        }

        Ok(Self {
            floor,
            section: section.to_string(),
            row: row.to_string(),
            number,
        })
    }
}

impl TryFrom<String> for StorageSeatId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StorageSeatId> for String {
    fn from(value: StorageSeatId) -> Self {
        value.to_string()
    }
}

/// Theater-wide running seat number shown to people ("19번").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplaySeatNumber(pub u32);

impl DisplaySeatNumber {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DisplaySeatNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A seat as a person names it: floor, row and display number, optionally
/// narrowed to a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySeat {
    pub floor: String,
    #[serde(default)]
    pub section: Option<String>,
    pub row: String,
    pub number: DisplaySeatNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    Available,
    Reserved,
    Holding,
}
