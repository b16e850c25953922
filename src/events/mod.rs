// src/events/mod.rs
//
// Change notification - Public API

pub mod change_bus;

pub use change_bus::{Change, ChangeBus};
