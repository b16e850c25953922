// src/lib.rs
// CurtainCall - Local persistence and media sync for a performance diary
//
// Architecture:
// - Domain-centric: Performance and Record entities with their invariants
// - Two stores: SQLite rows (object store) and image files (media store)
// - Repositories keep both stores consistent across multi-step operations
// - Local-first: remote catalog data is cached and readable offline
// - Explicit: no background work, no retries, no global state

// ============================================================================
// FOUNDATION
// ============================================================================

pub mod config;
pub mod db;
pub mod domain;
pub mod error;

// ============================================================================
// STORAGE
// ============================================================================

pub mod media;
pub mod store;

// ============================================================================
// ORCHESTRATION
// ============================================================================

pub mod events;
pub mod integrations;
pub mod repositories;

// ============================================================================
// PUBLIC API - Domain Entities
// ============================================================================

pub use domain::{
    clamp_rating,
    validate_performance,
    validate_record,
    Area,
    Genre,
    // Media
    MediaCategory,
    NewRecord,
    // Performance
    Performance,
    PerformanceDetail,
    PerformanceState,
    // Record
    Record,
    RecordPatch,
    RelatedLink,
};

// ============================================================================
// PUBLIC API - Errors and Configuration
// ============================================================================

pub use config::StorageConfig;
pub use error::{AppError, AppResult};

// ============================================================================
// PUBLIC API - Stores
// ============================================================================

pub use db::{create_connection_pool, initialize_database, ConnectionPool};
pub use media::{FileSystemMediaStore, ImagePipeline, MediaStorage};
pub use store::{
    InMemoryLikedPerformances, LikedPerformances, ObjectStore, Query, SqliteLikedPerformances,
    StoredObject,
};

// ============================================================================
// PUBLIC API - Collaborators
// ============================================================================

pub use integrations::{HttpImageFetcher, ImageFetcher, PerformanceDetailSource};

// ============================================================================
// PUBLIC API - Repositories and Notifications
// ============================================================================

pub use events::{Change, ChangeBus};
pub use repositories::{PerformanceRepository, RecordRepository};
