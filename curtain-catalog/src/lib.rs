pub mod grade;
pub mod layout;
pub mod models;
pub mod repository;
pub mod sample;
pub mod schedule;
pub mod scoring;

pub use grade::{grade_rank, normalize_grade, APRON_GRADE, GRADE_ORDER};
pub use layout::{VenueLayout, APRON_ROW, SECTION_ORDER};
pub use models::{
    Performance, PerformanceSummary, Row, Schedule, SeatEntry, SeatGrade, Section, ShowTime, Venue,
};
pub use repository::{CatalogError, CatalogFile, CatalogRepository, InMemoryCatalog};
pub use schedule::{list_schedules, parse_schedule_id, resolve_schedule, ScheduleListing, ScheduleQuery, ScheduleSlot};
pub use scoring::{SectionScoring, StageAlignment, VenueScoring};
