//! Scoring subsystem.
//!
//! Gameplay events are append-only; a container's score is recomputed from
//! its full event history after every append, never adjusted in place.

pub mod score_engine;

pub use score_engine::{ContainerPoints, ScoreBreakdown, ScoreEngine};
