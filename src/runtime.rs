//! Container runtime subsystem.
//!
//! Wraps the container engine behind the `ContainerRuntime` trait so the
//! orchestration layers never talk to the engine API directly.
//!
//! Components:
//! - `engine`: the runtime trait every adapter implements.
//! - `docker_runtime`: the Docker adapter used in production.
//! - `types`: endpoint and bulk-operation result types.

pub mod docker_runtime;
pub mod engine;
pub mod types;

#[cfg(test)]
pub mod mock;

pub use docker_runtime::DockerRuntime;
pub use engine::ContainerRuntime;
pub use types::{AttackerEndpoint, BulkOutcome};
