use super::entity::{Record, MAX_RATING, MIN_RATING};
use crate::domain::{DomainError, DomainResult};

/// Validates all Record invariants
pub fn validate_record(record: &Record) -> DomainResult<()> {
    if record.performance_id.trim().is_empty() {
        return Err(DomainError::InvariantViolation(
            "Record must belong to a Performance".to_string(),
        ));
    }
    if !(MIN_RATING..=MAX_RATING).contains(&record.rating) {
        return Err(DomainError::InvariantViolation(format!(
            "Rating {} outside {}..={}",
            record.rating, MIN_RATING, MAX_RATING
        )));
    }
    Ok(())
}

/// Critical Record Invariants:
///
/// 1. Record MUST reference exactly one existing Performance at creation
/// 2. performance_id is immutable
/// 3. Rating stays within 0.0..=5.0 (clamped, never rejected on input)
/// 4. Every image id has a file in the Record's media namespace
