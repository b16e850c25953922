// src/store/mod.rs
//
// Object Store Adapter
//
// CRITICAL RULES:
// - Stores are DUMB data mappers
// - NO media I/O
// - NO event emission
// - Referential integrity with the media store is the repositories' job

pub mod liked;
pub mod object_store;
pub mod rows;

pub use liked::{InMemoryLikedPerformances, LikedPerformances, SqliteLikedPerformances};
pub use object_store::{ObjectStore, Query, StoredObject, WriteTx};
pub use rows::{hydrate_performance, record_ids_for, RelatedLinkRow};
