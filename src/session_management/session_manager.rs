use std::sync::Arc;

use chrono::Utc;
use log::{error, info, warn};
use rand::Rng;
use uuid::Uuid;

use crate::configuration::Config;
use crate::container_pool::ContainerPool;
use crate::error_handling::types::SessionError;
use crate::runtime::ContainerRuntime;
use crate::storage::{Database, Level, Session, SessionStatus};

/// Parameters for creating a session. Every field falls back to a
/// configured default; an empty level selection means all allowed levels.
#[derive(Debug, Clone, Default)]
pub struct CreateSessionRequest {
    pub duration_secs: Option<i64>,
    pub max_players: Option<i64>,
    pub max_players_per_team: Option<i64>,
    pub team_count: Option<i64>,
    pub selected_levels: Vec<String>,
}

/// Owns the session lifecycle.
///
/// At most one session is live (pending or active) at a time: creating a new
/// one force-completes its predecessor and releases that session's
/// containers first.
pub struct SessionManager {
    db: Database,
    runtime: Arc<dyn ContainerRuntime>,
    pool: Arc<ContainerPool>,
    config: Config,
}

impl SessionManager {
    pub fn new(
        db: Database,
        runtime: Arc<dyn ContainerRuntime>,
        pool: Arc<ContainerPool>,
        config: Config,
    ) -> Self {
        Self {
            db,
            runtime,
            pool,
            config,
        }
    }

    pub async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<Session, SessionError> {
        let duration_secs = request
            .duration_secs
            .unwrap_or(self.config.session.default_duration_secs);
        if duration_secs <= 0 {
            return Err(SessionError::Validation(format!(
                "session duration must be positive, got {}",
                duration_secs
            )));
        }
        let max_players = request
            .max_players
            .unwrap_or(self.config.session.default_max_players);
        if max_players < 1 {
            return Err(SessionError::Validation(format!(
                "max players must be at least 1, got {}",
                max_players
            )));
        }
        let max_players_per_team = request.max_players_per_team.unwrap_or(1);
        if max_players_per_team < 1 {
            return Err(SessionError::Validation(format!(
                "players per team must be at least 1, got {}",
                max_players_per_team
            )));
        }
        let team_count = request.team_count.unwrap_or(0);
        if max_players_per_team > 1 && team_count < 1 {
            return Err(SessionError::Validation(
                "team mode requires at least one team".to_string(),
            ));
        }

        let selected_levels = self.resolve_level_selection(&request.selected_levels)?;

        // One live session at a time: retire the predecessor first.
        self.force_complete_live().await?;

        let session_code = self.sample_session_code().await?;
        let session = Session {
            id: Uuid::new_v4(),
            session_code,
            duration_secs,
            max_players,
            max_players_per_team,
            team_count,
            selected_levels: selected_levels.clone(),
            status: SessionStatus::Pending,
            created_at: Utc::now(),
            destroyed_at: None,
        };
        self.db.insert_session(&session).await?;

        let mut levels = Vec::with_capacity(selected_levels.len());
        for key in &selected_levels {
            let level = Level {
                id: Uuid::new_v4(),
                session_id: session.id,
                level_key: key.clone(),
                service_name: Level::service_name_for(session_code, key),
                points: self.config.level_points(key),
            };
            self.db.insert_level(&level).await?;
            levels.push(level);
        }

        // Teams share containers, so the whole pool must exist before the
        // first player shows up.
        if session.is_team_mode() {
            self.pool.provision_team_pool(&session).await?;
        }

        self.deploy_victims_detached(&levels);

        info!(
            "created session {} with levels [{}]",
            session_code,
            selected_levels.join(", ")
        );
        Ok(session)
    }

    /// Validates a level selection against the configured allow-list.
    /// An empty selection defaults to every allowed level.
    fn resolve_level_selection(&self, selected: &[String]) -> Result<Vec<String>, SessionError> {
        if selected.is_empty() {
            return Ok(self.config.allowed_level_keys());
        }
        let allowed = self.config.allowed_level_keys();
        let mut kept: Vec<String> = Vec::with_capacity(selected.len());
        for key in selected {
            if !allowed.contains(key) {
                continue;
            }
            if kept.contains(key) {
                return Err(SessionError::Validation(format!(
                    "duplicate level in selection: {}",
                    key
                )));
            }
            kept.push(key.clone());
        }
        if kept.is_empty() {
            return Err(SessionError::Validation(format!(
                "no valid level in selection [{}]",
                selected.join(", ")
            )));
        }
        Ok(kept)
    }

    /// Starts the victim services of a fresh session in the background.
    /// A deployment failure is logged; the session stays usable and the
    /// administrator can re-trigger deployment by recreating the session.
    fn deploy_victims_detached(&self, levels: &[Level]) {
        let runtime = Arc::clone(&self.runtime);
        let levels = levels.to_vec();
        tokio::spawn(async move {
            for level in levels {
                if let Err(e) = runtime
                    .ensure_victim(&level.service_name, &level.level_key)
                    .await
                {
                    error!("victim deployment failed for '{}': {}", level.service_name, e);
                }
            }
        });
    }

    /// Moves a session to a new status.
    ///
    /// Legal transitions: pending -> active (start), active -> pending
    /// (pause), and either -> completed. Completed is terminal. Setting the
    /// current status again is a no-op.
    pub async fn update_status(
        &self,
        session_id: Uuid,
        new_status: SessionStatus,
    ) -> Result<Session, SessionError> {
        let session = self
            .db
            .session_by_id(session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        if session.status == new_status {
            return Ok(session);
        }
        if session.status.is_terminal() {
            return Err(SessionError::InvalidTransition {
                from: session.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }

        self.db.set_session_status(session_id, new_status).await?;
        info!(
            "session {} moved {} -> {}",
            session.session_code,
            session.status.as_str(),
            new_status.as_str()
        );

        if new_status.is_terminal() {
            self.tear_down_session(&session).await;
        }

        let refreshed = self
            .db
            .session_by_id(session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        Ok(refreshed)
    }

    /// Releases a completed session's containers. Best effort: engine
    /// failures are logged so completion itself never rolls back.
    async fn tear_down_session(&self, session: &Session) {
        if let Err(e) = self.pool.release_session_containers(session.id).await {
            warn!(
                "failed to release containers of session {}: {}",
                session.session_code, e
            );
        }
        match self.db.levels_for_session(session.id).await {
            Ok(levels) => {
                for level in levels {
                    if let Err(e) = self.runtime.remove_container(&level.service_name).await {
                        warn!("failed to remove victim '{}': {}", level.service_name, e);
                    }
                }
            }
            Err(e) => warn!(
                "could not list levels of session {} for teardown: {}",
                session.session_code, e
            ),
        }
    }

    /// Force-completes every live session and tears its containers down.
    pub async fn force_complete_live(&self) -> Result<usize, SessionError> {
        let mut completed = 0;
        while let Some(session) = self.db.active_or_pending_session().await? {
            self.db
                .set_session_status(session.id, SessionStatus::Completed)
                .await?;
            self.tear_down_session(&session).await;
            info!("force-completed session {}", session.session_code);
            completed += 1;
        }
        Ok(completed)
    }

    /// Removes every session and its dependent rows after releasing any
    /// live containers.
    pub async fn delete_all_sessions(&self) -> Result<(), SessionError> {
        self.force_complete_live().await?;
        // Sweep up labeled attackers that lost their rows somewhere along
        // the way, best effort.
        if let Err(e) = self.runtime.remove_attackers().await {
            warn!("attacker sweep during delete-all failed: {}", e);
        }
        self.db.delete_all_sessions().await?;
        info!("deleted all sessions");
        Ok(())
    }

    pub async fn active_or_pending_session(&self) -> Result<Option<Session>, SessionError> {
        Ok(self.db.active_or_pending_session().await?)
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>, SessionError> {
        Ok(self.db.list_sessions().await?)
    }

    pub async fn session_by_id(&self, session_id: Uuid) -> Result<Session, SessionError> {
        self.db
            .session_by_id(session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    /// Samples an unused six-digit join code, bounded attempts.
    async fn sample_session_code(&self) -> Result<i64, SessionError> {
        for _ in 0..self.config.session.code_attempts {
            let candidate = rand::thread_rng().gen_range(100_000..=999_999);
            if !self.db.session_code_live(candidate).await? {
                return Ok(candidate);
            }
        }
        Err(SessionError::CodeSpaceExhausted)
    }
}
