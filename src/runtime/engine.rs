use async_trait::async_trait;

use crate::error_handling::types::RuntimeError;
use crate::runtime::types::{AttackerEndpoint, BulkOutcome};

/// The container engine seam.
///
/// Production uses the Docker adapter; orchestration tests substitute a mock.
/// Adapters never retry a failed engine call on their own and never touch the
/// database; callers decide how a runtime failure maps onto stored state.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Creates and starts one attacker sandbox, publishes its terminal
    /// service on a dynamic host port and waits until that port accepts TCP
    /// connections.
    async fn create_attacker(&self, name: &str) -> Result<AttackerEndpoint, RuntimeError>;

    /// Makes sure the victim service for a level is up, building its image
    /// from the level's build context first if the engine does not have it.
    /// Idempotent: an already-running victim is left untouched.
    async fn ensure_victim(&self, service_name: &str, level_key: &str)
        -> Result<(), RuntimeError>;

    /// Stops and removes one container by engine id.
    async fn remove_container(&self, runtime_id: &str) -> Result<(), RuntimeError>;

    /// Stops every labeled attacker container.
    async fn stop_attackers(&self) -> Result<BulkOutcome, RuntimeError>;

    /// Starts every labeled attacker container.
    async fn start_attackers(&self) -> Result<BulkOutcome, RuntimeError>;

    /// Force-removes every labeled attacker container.
    async fn remove_attackers(&self) -> Result<BulkOutcome, RuntimeError>;

    /// Resolves a source IP on the game network to the attacker container it
    /// belongs to, for attributing events that carry no container code.
    async fn attacker_for_ip(&self, ip: &str) -> Result<Option<String>, RuntimeError>;
}
