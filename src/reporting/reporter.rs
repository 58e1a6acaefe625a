use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error_handling::types::StorageError;
use crate::storage::Database;

const RECENT_EVENT_LIMIT: i64 = 20;

/// One leaderboard row, best score first.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub display_name: String,
    pub container_code: i64,
    pub total_score: i64,
    pub hint_used: i64,
    pub levels_completed: i64,
    pub player_names: Vec<String>,
}

/// One row of the recent activity feed.
#[derive(Debug, Clone, Serialize)]
pub struct RecentEvent {
    pub event_type: String,
    pub container_code: i64,
    pub point: Option<i64>,
    pub level_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Summary of the session players can currently join.
#[derive(Debug, Clone, Serialize)]
pub struct JoinableSession {
    pub session_code: i64,
    pub status: String,
    pub player_count: i64,
    pub max_players: i64,
    pub container_count: i64,
    pub selected_levels: Vec<String>,
}

/// Assembles the read-side views off stored state.
pub struct Reporter {
    db: Database,
}

impl Reporter {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Leaderboard of one session, ranked by total score.
    ///
    /// Free-for-all rows are named after their players; team rows get a
    /// rank-ordered team letter so the projection never leaks which players
    /// form which team mid-game.
    pub async fn leaderboard(&self, session_id: Uuid) -> Result<Vec<LeaderboardEntry>, StorageError> {
        let session = self
            .db
            .session_by_id(session_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(session_id.to_string()))?;
        let containers = self.db.containers_for_session(session_id).await?;

        let mut entries = Vec::with_capacity(containers.len());
        for (idx, container) in containers.iter().enumerate() {
            let player_names = self.db.player_names(container.id).await?;
            let display_name = if session.is_team_mode() {
                team_label(idx)
            } else if player_names.is_empty() {
                format!("#{}", container.container_code)
            } else {
                player_names.join(", ")
            };
            entries.push(LeaderboardEntry {
                rank: idx + 1,
                display_name,
                container_code: container.container_code,
                total_score: container.total_score,
                hint_used: container.hint_used,
                levels_completed: self.db.levels_completed_count(container.id).await?,
                player_names,
            });
        }
        Ok(entries)
    }

    /// The twenty most recent gameplay events of a session, newest first.
    pub async fn recent_events(&self, session_id: Uuid) -> Result<Vec<RecentEvent>, StorageError> {
        let rows = self.db.recent_events(session_id, RECENT_EVENT_LIMIT).await?;
        Ok(rows
            .into_iter()
            .map(|(event, container_code)| RecentEvent {
                level_key: event.level_key().map(str::to_string),
                event_type: event.event_type,
                container_code,
                point: event.point,
                created_at: event.created_at,
            })
            .collect())
    }

    /// The currently joinable session, if one exists.
    pub async fn joinable_session(&self) -> Result<Option<JoinableSession>, StorageError> {
        let Some(session) = self.db.active_or_pending_session().await? else {
            return Ok(None);
        };
        let player_count = self.db.session_player_count(session.id).await?;
        let container_count = self.db.container_count(session.id).await?;
        Ok(Some(JoinableSession {
            session_code: session.session_code,
            status: session.status.as_str().to_string(),
            player_count,
            max_players: session.max_players,
            container_count,
            selected_levels: session.selected_levels.clone(),
        }))
    }
}

/// Rank-ordered team name: Team A, Team B, ... then Team 27 onwards.
fn team_label(idx: usize) -> String {
    if idx < 26 {
        format!("Team {}", (b'A' + idx as u8) as char)
    } else {
        format!("Team {}", idx + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::{Config, ScoringConfig};
    use crate::container_pool::ContainerPool;
    use crate::join::JoinCoordinator;
    use crate::runtime::mock::MockRuntime;
    use crate::runtime::ContainerRuntime;
    use crate::scoring::ScoreEngine;
    use crate::session_management::{CreateSessionRequest, SessionManager};
    use serde_json::json;
    use std::sync::Arc;

    struct Fixture {
        reporter: Reporter,
        manager: SessionManager,
        coordinator: JoinCoordinator,
        scoring: ScoreEngine,
    }

    async fn fixture() -> Fixture {
        let db = Database::in_memory().await.unwrap();
        let runtime = Arc::new(MockRuntime::new()) as Arc<dyn ContainerRuntime>;
        let config = Config::default();
        let pool = Arc::new(ContainerPool::new(
            db.clone(),
            runtime.clone(),
            config.session.clone(),
        ));
        Fixture {
            reporter: Reporter::new(db.clone()),
            manager: SessionManager::new(db.clone(), runtime, pool.clone(), config),
            coordinator: JoinCoordinator::new(db.clone(), pool),
            scoring: ScoreEngine::new(db, ScoringConfig::default()),
        }
    }

    #[tokio::test]
    async fn ffa_leaderboard_ranks_by_score_and_names_players() {
        let f = fixture().await;
        let session = f.manager.create_session(CreateSessionRequest::default()).await.unwrap();

        let alice = f.coordinator.join(session.session_code, "Alice").await.unwrap();
        let bob = f.coordinator.join(session.session_code, "Bob").await.unwrap();

        f.scoring
            .record_event(bob.container.id, "foundFlag_accepted", Some(50), json!({}))
            .await
            .unwrap();
        f.scoring
            .record_event(alice.container.id, "foundFlag_accepted", Some(10), json!({}))
            .await
            .unwrap();

        let board = f.reporter.leaderboard(session.id).await.unwrap();
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].display_name, "bob");
        assert_eq!(board[0].total_score, 50);
        assert_eq!(board[1].display_name, "alice");
    }

    #[tokio::test]
    async fn team_leaderboard_uses_rank_ordered_letters() {
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

        let alice = f.coordinator.join(session.session_code, "Alice").await.unwrap();
        f.coordinator.join(session.session_code, "Bob").await.unwrap();
        f.scoring
            .record_event(alice.container.id, "foundFlag_accepted", Some(30), json!({}))
            .await
            .unwrap();

        let board = f.reporter.leaderboard(session.id).await.unwrap();
        assert_eq!(board[0].display_name, "Team A");
        assert_eq!(board[0].total_score, 30);
        assert_eq!(board[1].display_name, "Team B");
        // Alice's team leads, so her name sits behind Team A.
        assert_eq!(board[0].player_names, vec!["alice"]);
    }

    #[tokio::test]
    async fn recent_events_are_newest_first_and_bounded() {
        let f = fixture().await;
        let session = f.manager.create_session(CreateSessionRequest::default()).await.unwrap();
        let joined = f.coordinator.join(session.session_code, "Alice").await.unwrap();

        for i in 0..25 {
            f.scoring
                .record_event(
                    joined.container.id,
                    "foundFlag_accepted",
                    Some(i),
                    json!({}),
                )
                .await
                .unwrap();
        }

        let feed = f.reporter.recent_events(session.id).await.unwrap();
        assert_eq!(feed.len(), 20);
        assert_eq!(feed[0].container_code, joined.container.container_code);
    }

    #[tokio::test]
    async fn joinable_session_reports_player_count() {
        let f = fixture().await;
        assert!(f.reporter.joinable_session().await.unwrap().is_none());

        let session = f.manager.create_session(CreateSessionRequest::default()).await.unwrap();
        f.coordinator.join(session.session_code, "Alice").await.unwrap();

        let summary = f.reporter.joinable_session().await.unwrap().unwrap();
        assert_eq!(summary.session_code, session.session_code);
        assert_eq!(summary.player_count, 1);
        assert_eq!(summary.status, "pending");
    }
}
