use std::sync::Arc;

use log::info;
use uuid::Uuid;

use crate::container_pool::ContainerPool;
use crate::error_handling::types::{JoinError, StorageError};
use crate::storage::{ContainerRecord, Database, Session, User};

/// What a successful join hands back to the player: their session, the
/// container they landed in (with its terminal URL) and their user record.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub session: Session,
    pub container: ContainerRecord,
    pub user: User,
}

/// Admits players into a live session.
pub struct JoinCoordinator {
    db: Database,
    pool: Arc<ContainerPool>,
}

impl JoinCoordinator {
    pub fn new(db: Database, pool: Arc<ContainerPool>) -> Self {
        Self { db, pool }
    }

    /// Joins a player to the session behind a six-digit code.
    ///
    /// Display names are trimmed, must be 2 to 20 characters and unique
    /// within the session ignoring case; they are stored lowercased. Team
    /// sessions place the player into the least occupied team with room;
    /// free-for-all sessions provision a fresh container per player until
    /// the player cap is reached. A full session rejects the join without
    /// creating anything.
    pub async fn join(
        &self,
        session_code: i64,
        display_name: &str,
    ) -> Result<JoinOutcome, JoinError> {
        let name = display_name.trim();
        let len = name.chars().count();
        if !(2..=20).contains(&len) {
            return Err(JoinError::BadNameLength(len));
        }

        let session = self
            .db
            .session_by_code_live(session_code)
            .await?
            .ok_or_else(|| JoinError::SessionNotFound(session_code.to_string()))?;

        let nick_name = name.to_lowercase();
        if self.db.nickname_taken(session.id, &nick_name).await? {
            return Err(JoinError::DuplicateName(name.to_string()));
        }

        let container = match self.pool.find_available(&session).await? {
            Some(container) => container,
            None if session.is_team_mode() => return Err(JoinError::SessionFull),
            None => {
                let player_count = self.db.session_player_count(session.id).await?;
                if player_count >= session.max_players {
                    return Err(JoinError::SessionFull);
                }
                self.pool.provision(&session).await?
            }
        };

        let user = User {
            id: Uuid::new_v4(),
            nick_name,
            container_id: container.id,
        };
        self.db.insert_user(&user).await?;
        self.db.increment_user_count(container.id).await?;

        let container = self
            .db
            .container_by_id(container.id)
            .await?
            .ok_or_else(|| StorageError::NotFound(container.id.to_string()))?;

        info!(
            "player '{}' joined session {} in container {}",
            user.nick_name, session.session_code, container.container_code
        );
        Ok(JoinOutcome {
            session,
            container,
            user,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::Config;
    use crate::runtime::mock::MockRuntime;
    use crate::runtime::ContainerRuntime;
    use crate::session_management::{CreateSessionRequest, SessionManager};
    use crate::storage::SessionStatus;

    struct Fixture {
        coordinator: JoinCoordinator,
        manager: SessionManager,
        db: Database,
        runtime: Arc<MockRuntime>,
    }

    async fn fixture() -> Fixture {
        let db = Database::in_memory().await.unwrap();
        let runtime = Arc::new(MockRuntime::new());
        let config = Config::default();
        let pool = Arc::new(ContainerPool::new(
            db.clone(),
            runtime.clone() as Arc<dyn ContainerRuntime>,
            config.session.clone(),
        ));
        let manager = SessionManager::new(
            db.clone(),
            runtime.clone() as Arc<dyn ContainerRuntime>,
            pool.clone(),
            config,
        );
        let coordinator = JoinCoordinator::new(db.clone(), pool);
        Fixture {
            coordinator,
            manager,
            db,
            runtime,
        }
    }

    #[tokio::test]
    async fn ffa_join_provisions_one_container_per_player() {
        let f = fixture().await;
        let session = f
            .manager
            .create_session(CreateSessionRequest {
                max_players: Some(3),
                ..Default::default()
            })
            .await
            .unwrap();

        let alice = f.coordinator.join(session.session_code, "Alice").await.unwrap();
        let bob = f.coordinator.join(session.session_code, "Bob").await.unwrap();
        assert_ne!(alice.container.id, bob.container.id);
        assert_eq!(alice.user.nick_name, "alice");
        assert_eq!(alice.container.user_connected_count, 1);
        assert_eq!(f.runtime.created_count(), 2);
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected_ignoring_case() {
        let f = fixture().await;
        let session = f.manager.create_session(CreateSessionRequest::default()).await.unwrap();

        f.coordinator.join(session.session_code, "Alice").await.unwrap();
        let err = f
            .coordinator
            .join(session.session_code, "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, JoinError::DuplicateName(_)));
        assert!(err.is_user_facing());
        // The rejected join created nothing.
        assert_eq!(f.runtime.created_count(), 1);
    }

    #[tokio::test]
    async fn team_join_balances_and_rejects_when_full() {
        let f = fixture().await;
        let session = f
            .manager
            .create_session(CreateSessionRequest {
                max_players_per_team: Some(2),
                team_count: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(f.runtime.created_count(), 2);

        let a = f.coordinator.join(session.session_code, "Alice").await.unwrap();
        let b = f.coordinator.join(session.session_code, "Bob").await.unwrap();
        // First two players land on different teams.
        assert_ne!(a.container.id, b.container.id);

        f.coordinator.join(session.session_code, "Carol").await.unwrap();
        f.coordinator.join(session.session_code, "Dave").await.unwrap();

        let err = f
            .coordinator
            .join(session.session_code, "Eve")
            .await
            .unwrap_err();
        assert!(matches!(err, JoinError::SessionFull));
        // No container was provisioned and no user row written for Eve.
        assert_eq!(f.runtime.created_count(), 2);
        assert!(!f.db.nickname_taken(session.id, "eve").await.unwrap());
    }

    #[tokio::test]
    async fn ffa_join_respects_player_cap() {
        let f = fixture().await;
        let session = f
            .manager
            .create_session(CreateSessionRequest {
                max_players: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();

        f.coordinator.join(session.session_code, "Alice").await.unwrap();
        let err = f
            .coordinator
            .join(session.session_code, "Bob")
            .await
            .unwrap_err();
        assert!(matches!(err, JoinError::SessionFull));
    }

    #[tokio::test]
    async fn name_length_is_validated_after_trim() {
        let f = fixture().await;
        let session = f.manager.create_session(CreateSessionRequest::default()).await.unwrap();

        let err = f.coordinator.join(session.session_code, "  a  ").await.unwrap_err();
        assert!(matches!(err, JoinError::BadNameLength(1)));

        let long = "x".repeat(21);
        let err = f.coordinator.join(session.session_code, &long).await.unwrap_err();
        assert!(matches!(err, JoinError::BadNameLength(21)));

        f.coordinator.join(session.session_code, "  ab  ").await.unwrap();
    }

    #[tokio::test]
    async fn completed_session_is_not_joinable() {
        let f = fixture().await;
        let session = f.manager.create_session(CreateSessionRequest::default()).await.unwrap();
        f.manager
            .update_status(session.id, SessionStatus::Completed)
            .await
            .unwrap();

        let err = f
            .coordinator
            .join(session.session_code, "Alice")
            .await
            .unwrap_err();
        assert!(matches!(err, JoinError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn unknown_code_is_rejected() {
        let f = fixture().await;
        let err = f.coordinator.join(999999, "Alice").await.unwrap_err();
        assert!(matches!(err, JoinError::SessionNotFound(_)));
    }
}
