//! Player admission.
//!
//! Validates display names, resolves join codes and places players into
//! attacker containers.

pub mod coordinator;

pub use coordinator::{JoinCoordinator, JoinOutcome};
