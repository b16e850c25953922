// src/repositories/mod.rs
//
// Repository layer
//
// CRITICAL RULES:
// - Repositories own referential integrity between rows and image files
// - Each repository is a single logical writer (one call at a time)
// - Media I/O happens between store writes, never inside one
// - NO internal retries; callers decide whether to retry, log or surface

pub mod performance_repository;
pub mod record_repository;

pub use performance_repository::PerformanceRepository;
pub use record_repository::RecordRepository;

#[cfg(test)]
mod lifecycle_tests;
