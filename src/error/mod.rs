// src/error/mod.rs
//
// Crate-wide error taxonomy

pub mod types;

pub use types::{AppError, AppResult};
