// src/domain/mod.rs
//
// Domain Root - The Single Source of Truth for Domain API
//
// This file MUST declare all domain modules and re-export their public API.
// All other modules import from `crate::domain::*`

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod media;
pub mod performance;
pub mod record;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Performance Domain
pub use performance::{
    validate_performance, Area, Genre, Performance, PerformanceDetail, PerformanceState,
    RelatedLink,
};

// Record Domain
pub use record::{
    clamp_rating, validate_record, NewRecord, Record, RecordPatch, MAX_RATING, MIN_RATING,
};

// Media
pub use media::MediaCategory;

// ============================================================================
// DOMAIN ERROR TYPES
// ============================================================================

use thiserror::Error;

/// Domain-level errors
/// These represent violations of business rules and invariants
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

/// Domain result type
pub type DomainResult<T> = Result<T, DomainError>;
