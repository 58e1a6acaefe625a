//! Error types shared across the subsystems.

pub mod types;
