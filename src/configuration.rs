//! Runtime configuration for the range orchestrator.
//!
//! Configuration is loaded from a TOML file whose path is given on the
//! command line. Components:
//! - `config`: the top-level [`Config`] structure and file loading.
//! - `types`: per-subsystem configuration sections.

pub mod config;
pub mod types;

pub use config::Config;
pub use types::{RuntimeConfig, ScoringConfig, SessionConfig, WebConfig};
