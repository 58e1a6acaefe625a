use std::sync::Arc;

use log::{info, warn};
use rand::Rng;
use uuid::Uuid;

use crate::configuration::SessionConfig;
use crate::error_handling::types::{SessionError, StorageError};
use crate::runtime::ContainerRuntime;
use crate::storage::{ContainerRecord, ContainerStatus, Database, Session};

/// Manages the attacker sandboxes of every session.
///
/// Free-for-all sessions get one container per player, provisioned lazily at
/// join time. Team sessions get their whole pool up front so teams exist
/// before anyone joins.
pub struct ContainerPool {
    db: Database,
    runtime: Arc<dyn ContainerRuntime>,
    config: SessionConfig,
}

impl ContainerPool {
    pub fn new(db: Database, runtime: Arc<dyn ContainerRuntime>, config: SessionConfig) -> Self {
        Self {
            db,
            runtime,
            config,
        }
    }

    /// How many players one container of this session may hold.
    pub fn capacity_for(session: &Session) -> i64 {
        if session.is_team_mode() {
            session.max_players_per_team
        } else {
            1
        }
    }

    /// A joinable container of the session with room left, least occupied
    /// first so team sizes stay balanced.
    pub async fn find_available(
        &self,
        session: &Session,
    ) -> Result<Option<ContainerRecord>, StorageError> {
        self.db
            .available_container(session.id, Self::capacity_for(session))
            .await
    }

    pub async fn session_player_count(&self, session_id: Uuid) -> Result<i64, StorageError> {
        self.db.session_player_count(session_id).await
    }

    /// Creates one attacker sandbox for the session.
    ///
    /// The row is inserted as `creating` before the engine call so the code
    /// is reserved; a failed engine call flips it straight to `removed` so no
    /// joinable phantom remains.
    pub async fn provision(&self, session: &Session) -> Result<ContainerRecord, SessionError> {
        let container_code = self.sample_container_code().await?;
        let record = ContainerRecord {
            id: Uuid::new_v4(),
            container_code,
            container_url: None,
            session_id: session.id,
            user_connected_count: 0,
            total_score: 0,
            hint_used: 0,
            runtime_id: None,
            status: ContainerStatus::Creating,
        };
        self.db.insert_container(&record).await?;

        let name = format!("mits-attacker-{}", container_code);
        match self.runtime.create_attacker(&name).await {
            Ok(endpoint) => {
                self.db
                    .set_container_endpoint(
                        record.id,
                        &endpoint.runtime_id,
                        &endpoint.terminal_url,
                        ContainerStatus::Started,
                    )
                    .await?;
                info!(
                    "provisioned container {} for session {}",
                    container_code, session.session_code
                );
                let refreshed = self
                    .db
                    .container_by_id(record.id)
                    .await?
                    .ok_or_else(|| StorageError::NotFound(record.id.to_string()))?;
                Ok(refreshed)
            }
            Err(e) => {
                self.db
                    .set_container_status(record.id, ContainerStatus::Removed)
                    .await?;
                Err(e.into())
            }
        }
    }

    /// Eagerly creates the fixed pool of a team session, one container per
    /// team. Stops at the first failure; already-created containers stay.
    pub async fn provision_team_pool(
        &self,
        session: &Session,
    ) -> Result<Vec<ContainerRecord>, SessionError> {
        let mut pool = Vec::with_capacity(session.team_count as usize);
        for _ in 0..session.team_count {
            pool.push(self.provision(session).await?);
        }
        Ok(pool)
    }

    /// Tears down every runtime container of a session and marks the rows
    /// removed. Engine failures are logged, not propagated, so a wedged
    /// container cannot keep a session alive.
    pub async fn release_session_containers(&self, session_id: Uuid) -> Result<(), StorageError> {
        let containers = self.db.containers_for_session(session_id).await?;
        for container in &containers {
            if container.status == ContainerStatus::Removed {
                continue;
            }
            if let Some(ref runtime_id) = container.runtime_id {
                if let Err(e) = self.runtime.remove_container(runtime_id).await {
                    warn!(
                        "failed to remove container {} of session {}: {}",
                        container.container_code, session_id, e
                    );
                }
            }
        }
        self.db.mark_session_containers_removed(session_id).await
    }

    /// Samples an unused eight-digit container code, bounded attempts.
    async fn sample_container_code(&self) -> Result<i64, SessionError> {
        for _ in 0..self.config.code_attempts {
            let candidate = rand::thread_rng().gen_range(10_000_000..=99_999_999);
            if self.db.container_by_code(candidate).await?.is_none() {
                return Ok(candidate);
            }
        }
        Err(SessionError::CodeSpaceExhausted)
    }
}
