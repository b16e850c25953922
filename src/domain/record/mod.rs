pub mod entity;
pub mod invariants;

pub use entity::{clamp_rating, NewRecord, Record, RecordPatch, MAX_RATING, MIN_RATING};
pub use invariants::validate_record;
