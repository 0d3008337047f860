pub mod availability;
pub mod recommend;
pub mod scoring;

pub use availability::{project, AvailabilityProjector, SeatStatusMap};
pub use recommend::{
    build_availability, format_won, validate_party_size, GradeRecommendation, GradeSummary,
    RecommendRequest, SeatAvailability, SeatOption, SeatRecommender, DEFAULT_MAX_PARTY_SIZE,
};
