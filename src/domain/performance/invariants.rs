use super::entity::Performance;
use crate::domain::{DomainError, DomainResult};

/// Validates all Performance invariants
pub fn validate_performance(performance: &Performance) -> DomainResult<()> {
    if performance.id.trim().is_empty() {
        return Err(DomainError::InvariantViolation(
            "Performance id cannot be empty".to_string(),
        ));
    }
    // The id names the media namespace directory
    if performance.id == "."
        || performance.id == ".."
        || performance.id.contains(['/', '\\', '\0'])
    {
        return Err(DomainError::InvariantViolation(format!(
            "Performance id {:?} cannot be used as a media namespace",
            performance.id
        )));
    }
    if performance.name.trim().is_empty() {
        return Err(DomainError::InvariantViolation(
            "Performance name cannot be empty".to_string(),
        ));
    }
    if performance.start_date > performance.end_date {
        return Err(DomainError::InvariantViolation(format!(
            "Start date {} cannot be after end date {}",
            performance.start_date, performance.end_date
        )));
    }
    Ok(())
}

/// Invariants that must hold true for Performance domain:
///
/// 1. Identity is the external catalog id and never changes; it is a single
///    path component
/// 2. Image id lists reflect display order, not arrival order
/// 3. Record ids are derived from the owning Records, not stored
/// 4. Deleting a Performance deletes its Records and both media namespaces
