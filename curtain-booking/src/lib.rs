pub mod desk;
pub mod expiry;
pub mod manager;
pub mod policy;

pub use desk::{DisplayStatus, ReservationDesk, ReservationView};
pub use expiry::ExpirySweeper;
pub use manager::{parse_seat_ids, HoldRules, HoldingDetail, HoldingManager, HoldingSeatView, DEFAULT_HOLD_TTL_SECONDS};
pub use policy::{AllowMultipleHolds, HoldPolicy, HoldPolicyKind, SingleActiveHold};
