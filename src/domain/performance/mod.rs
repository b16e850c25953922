pub mod entity;
pub mod invariants;

pub use entity::{Area, Genre, Performance, PerformanceDetail, PerformanceState, RelatedLink};
pub use invariants::validate_performance;
