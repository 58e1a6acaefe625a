use chrono::Utc;
use log::{debug, info};
use uuid::Uuid;

use crate::configuration::ScoringConfig;
use crate::error_handling::types::{EventError, StorageError};
use crate::storage::{Database, EventType, GameEvent};

/// Per-container score decomposition.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScoreBreakdown {
    pub flag_points: i64,
    pub level_points: i64,
    pub hint_count: i64,
    pub hint_penalty: i64,
    pub total: i64,
}

/// One container's breakdown inside a session-wide distribution.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPoints {
    pub container_code: i64,
    #[serde(flatten)]
    pub breakdown: ScoreBreakdown,
}

/// Records gameplay events and keeps container scores consistent with the
/// event log.
pub struct ScoreEngine {
    db: Database,
    config: ScoringConfig,
}

impl ScoreEngine {
    pub fn new(db: Database, config: ScoringConfig) -> Self {
        Self { db, config }
    }

    /// Appends one event and recomputes the container's score from the full
    /// history. Appending the same logical event twice changes the score the
    /// same way it would have the first time; level completions stay deduped.
    pub async fn record_event(
        &self,
        container_id: Uuid,
        event_type: &str,
        point: Option<i64>,
        metadata: serde_json::Value,
    ) -> Result<GameEvent, EventError> {
        let container = self
            .db
            .container_by_id(container_id)
            .await?
            .ok_or_else(|| EventError::ContainerNotFound(container_id.to_string()))?;

        // Hints carry no point of their own; the penalty is applied during
        // recomputation so a penalty change re-prices past hints too.
        let stored_point = match EventType::parse(event_type) {
            EventType::HintRequested => None,
            _ => point,
        };

        let event = GameEvent {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            container_id,
            point: stored_point,
            metadata,
            created_at: Utc::now(),
        };
        self.db.insert_event(&event).await?;

        let breakdown = self
            .recompute(container_id, container.session_id, None)
            .await?;
        self.db
            .update_scores(container_id, breakdown.total, breakdown.hint_count)
            .await?;
        info!(
            "event '{}' for container {}: score now {}",
            event_type, container.container_code, breakdown.total
        );
        Ok(event)
    }

    /// Derives a container's score from its event history.
    ///
    /// Flag points sum as captured; each distinct completed level counts its
    /// configured points once; every hint subtracts the penalty. A penalty
    /// override prices the same history with a different hint cost without
    /// touching stored state.
    pub async fn recompute(
        &self,
        container_id: Uuid,
        session_id: Uuid,
        penalty_override: Option<i64>,
    ) -> Result<ScoreBreakdown, StorageError> {
        let events = self.db.events_for_container(container_id).await?;
        let hint_penalty = penalty_override.unwrap_or(self.config.hint_penalty);

        let mut flag_points = 0;
        let mut level_points = 0;
        let mut hint_count = 0;
        let mut completed_levels: Vec<String> = Vec::new();

        for event in &events {
            match EventType::parse(&event.event_type) {
                EventType::FlagCaptured => {
                    flag_points += event.point.unwrap_or(0);
                }
                EventType::LevelCompleted => {
                    let Some(key) = event.level_key() else {
                        debug!("level_completed event {} has no level key", event.id);
                        continue;
                    };
                    if completed_levels.iter().any(|k| k == key) {
                        continue;
                    }
                    completed_levels.push(key.to_string());
                    level_points += self.db.level_completion_point(session_id, key).await?;
                }
                EventType::HintRequested => hint_count += 1,
                EventType::Other(_) => {}
            }
        }

        let total = flag_points + level_points - hint_count * hint_penalty;
        Ok(ScoreBreakdown {
            flag_points,
            level_points,
            hint_count,
            hint_penalty,
            total,
        })
    }

    /// Breakdown for every container of a session, best total first,
    /// optionally re-priced with a different hint penalty. Display-only;
    /// stored scores are untouched.
    pub async fn session_point_distribution(
        &self,
        session_id: Uuid,
        penalty_override: Option<i64>,
    ) -> Result<Vec<ContainerPoints>, StorageError> {
        let containers = self.db.containers_for_session(session_id).await?;
        let mut distribution = Vec::with_capacity(containers.len());
        for container in containers {
            let breakdown = self
                .recompute(container.id, session_id, penalty_override)
                .await?;
            distribution.push(ContainerPoints {
                container_code: container.container_code,
                breakdown,
            });
        }
        distribution.sort_by(|a, b| b.breakdown.total.cmp(&a.breakdown.total));
        Ok(distribution)
    }

    /// Score decomposition for display, optionally re-priced with a
    /// different hint penalty.
    pub async fn point_distribution(
        &self,
        container_id: Uuid,
        penalty_override: Option<i64>,
    ) -> Result<ScoreBreakdown, EventError> {
        let container = self
            .db
            .container_by_id(container_id)
            .await?
            .ok_or_else(|| EventError::ContainerNotFound(container_id.to_string()))?;
        Ok(self
            .recompute(container_id, container.session_id, penalty_override)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ContainerRecord, ContainerStatus, Level, Session, SessionStatus};
    use serde_json::json;

    async fn scoring_fixture() -> (ScoreEngine, Database, Session, ContainerRecord) {
        let db = Database::in_memory().await.unwrap();
        let session = Session {
            id: Uuid::new_v4(),
            session_code: 123456,
            duration_secs: 3600,
            max_players: 4,
            max_players_per_team: 1,
            team_count: 0,
            selected_levels: vec!["level1".into(), "level2".into()],
            status: SessionStatus::Active,
            created_at: Utc::now(),
            destroyed_at: None,
        };
        db.insert_session(&session).await.unwrap();
        for (key, points) in [("level1", 100), ("level2", 150)] {
            db.insert_level(&Level {
                id: Uuid::new_v4(),
                session_id: session.id,
                level_key: key.to_string(),
                service_name: Level::service_name_for(session.session_code, key),
                points,
            })
            .await
            .unwrap();
        }
        let container = ContainerRecord {
            id: Uuid::new_v4(),
            container_code: 10000001,
            container_url: None,
            session_id: session.id,
            user_connected_count: 1,
            total_score: 0,
            hint_used: 0,
            runtime_id: None,
            status: ContainerStatus::Healthy,
        };
        db.insert_container(&container).await.unwrap();
        let engine = ScoreEngine::new(db.clone(), ScoringConfig::default());
        (engine, db, session, container)
    }

    #[tokio::test]
    async fn flags_hints_and_levels_combine() {
        let (engine, db, _, container) = scoring_fixture().await;

        engine
            .record_event(container.id, "foundFlag_accepted", Some(10), json!({}))
            .await
            .unwrap();
        engine
            .record_event(container.id, "hint_requested", None, json!({}))
            .await
            .unwrap();
        engine
            .record_event(
                container.id,
                "level_completed",
                None,
                json!({ "levelKey": "level1" }),
            )
            .await
            .unwrap();

        let stored = db.container_by_id(container.id).await.unwrap().unwrap();
        assert_eq!(stored.total_score, 10 - 5 + 100);
        assert_eq!(stored.hint_used, 1);
    }

    #[tokio::test]
    async fn repeated_level_completion_counts_once() {
        let (engine, db, _, container) = scoring_fixture().await;

        for _ in 0..3 {
            engine
                .record_event(
                    container.id,
                    "level_completed",
                    None,
                    json!({ "levelKey": "level1" }),
                )
                .await
                .unwrap();
        }

        let stored = db.container_by_id(container.id).await.unwrap().unwrap();
        assert_eq!(stored.total_score, 100);

        // A different level still counts.
        engine
            .record_event(
                container.id,
                "level_completed",
                None,
                json!({ "levelKey": "level2" }),
            )
            .await
            .unwrap();
        let stored = db.container_by_id(container.id).await.unwrap().unwrap();
        assert_eq!(stored.total_score, 250);
    }

    #[tokio::test]
    async fn level_completion_resolves_full_service_name() {
        let (engine, db, _, container) = scoring_fixture().await;
        engine
            .record_event(
                container.id,
                "level_completed",
                None,
                json!({ "levelKey": "mits-s123456-level2" }),
            )
            .await
            .unwrap();
        let stored = db.container_by_id(container.id).await.unwrap().unwrap();
        assert_eq!(stored.total_score, 150);
    }

    #[tokio::test]
    async fn unknown_event_types_and_levels_do_not_score() {
        let (engine, db, _, container) = scoring_fixture().await;
        engine
            .record_event(container.id, "keystroke", Some(999), json!({}))
            .await
            .unwrap();
        engine
            .record_event(
                container.id,
                "level_completed",
                None,
                json!({ "levelKey": "level9" }),
            )
            .await
            .unwrap();
        let stored = db.container_by_id(container.id).await.unwrap().unwrap();
        assert_eq!(stored.total_score, 0);
    }

    #[tokio::test]
    async fn hint_points_are_stored_null_and_priced_at_read_time() {
        let (engine, db, session, container) = scoring_fixture().await;
        engine
            .record_event(container.id, "hint_requested", Some(42), json!({}))
            .await
            .unwrap();

        let events = db.events_for_container(container.id).await.unwrap();
        assert_eq!(events[0].point, None);

        let stored = db.container_by_id(container.id).await.unwrap().unwrap();
        assert_eq!(stored.total_score, -5);

        let repriced = engine
            .recompute(container.id, session.id, Some(20))
            .await
            .unwrap();
        assert_eq!(repriced.total, -20);
        // Re-pricing is display-only.
        let stored = db.container_by_id(container.id).await.unwrap().unwrap();
        assert_eq!(stored.total_score, -5);
    }

    #[tokio::test]
    async fn session_distribution_ranks_containers() {
        let (engine, db, session, container) = scoring_fixture().await;
        let rival = ContainerRecord {
            id: Uuid::new_v4(),
            container_code: 10000002,
            container_url: None,
            session_id: session.id,
            user_connected_count: 1,
            total_score: 0,
            hint_used: 0,
            runtime_id: None,
            status: ContainerStatus::Healthy,
        };
        db.insert_container(&rival).await.unwrap();

        engine
            .record_event(container.id, "foundFlag_accepted", Some(10), json!({}))
            .await
            .unwrap();
        engine
            .record_event(rival.id, "foundFlag_accepted", Some(40), json!({}))
            .await
            .unwrap();

        let distribution = engine
            .session_point_distribution(session.id, None)
            .await
            .unwrap();
        assert_eq!(distribution.len(), 2);
        assert_eq!(distribution[0].container_code, rival.container_code);
        assert_eq!(distribution[0].breakdown.total, 40);
        assert_eq!(distribution[1].breakdown.total, 10);
    }

    #[tokio::test]
    async fn event_for_unknown_container_is_rejected() {
        let (engine, _, _, _) = scoring_fixture().await;
        let err = engine
            .record_event(Uuid::new_v4(), "foundFlag_accepted", Some(1), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, EventError::ContainerNotFound(_)));
    }
}
