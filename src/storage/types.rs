use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents the current status of a game session.
///
/// Variants:
/// - `Pending`: created, waiting for the administrator to start the game.
/// - `Active`: the game is running.
/// - `Completed`: terminal; the session's attacker containers are released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<SessionStatus> {
        match raw {
            "pending" => Some(SessionStatus::Pending),
            "active" => Some(SessionStatus::Active),
            // Aliases used by earlier revisions of the admin tooling.
            "completed" | "finished" | "ended" => Some(SessionStatus::Completed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed)
    }
}

/// One timed instance of the training game, identified by a six-digit code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub session_code: i64,
    pub duration_secs: i64,
    pub max_players: i64,
    /// 1 means free-for-all (one container per player); greater than 1 means
    /// team mode (players share a container).
    pub max_players_per_team: i64,
    pub team_count: i64,
    pub selected_levels: Vec<String>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub destroyed_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_team_mode(&self) -> bool {
        self.max_players_per_team > 1
    }
}

/// A scored target service within a session.
///
/// The service name embeds the session code so identically-named levels in
/// different sessions never collide: `mits-s{code}-{key}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Level {
    pub id: Uuid,
    pub session_id: Uuid,
    pub level_key: String,
    pub service_name: String,
    pub points: i64,
}

impl Level {
    pub fn service_name_for(session_code: i64, level_key: &str) -> String {
        format!("mits-s{}-{}", session_code, level_key)
    }
}

/// Lifecycle status of a player/team attacker container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Creating,
    Started,
    Healthy,
    Stopped,
    Removed,
}

impl ContainerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerStatus::Creating => "creating",
            ContainerStatus::Started => "started",
            ContainerStatus::Healthy => "healthy",
            ContainerStatus::Stopped => "stopped",
            ContainerStatus::Removed => "removed",
        }
    }

    pub fn parse(raw: &str) -> Option<ContainerStatus> {
        match raw {
            "creating" => Some(ContainerStatus::Creating),
            "started" => Some(ContainerStatus::Started),
            "healthy" => Some(ContainerStatus::Healthy),
            "stopped" => Some(ContainerStatus::Stopped),
            "removed" => Some(ContainerStatus::Removed),
            _ => None,
        }
    }

    /// Players may only be assigned to containers in these states.
    pub fn is_joinable(&self) -> bool {
        matches!(
            self,
            ContainerStatus::Creating | ContainerStatus::Started | ContainerStatus::Healthy
        )
    }
}

/// A player's or team's attacker sandbox.
///
/// The record outlives the runtime container: when a session ends the
/// container is removed from the engine but the row is kept for history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: Uuid,
    /// Eight-digit short code players use to reference the container.
    pub container_code: i64,
    pub container_url: Option<String>,
    pub session_id: Uuid,
    pub user_connected_count: i64,
    pub total_score: i64,
    pub hint_used: i64,
    /// Identifier of the container inside the runtime engine, once started.
    pub runtime_id: Option<String>,
    pub status: ContainerStatus,
}

/// A joined player. Nick names are stored lowercased; uniqueness within a
/// session is case-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub nick_name: String,
    pub container_id: Uuid,
}

/// Gameplay event types relevant to scoring. Unknown types are stored
/// verbatim in the log and ignored by the score computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    FlagCaptured,
    LevelCompleted,
    HintRequested,
    Other(String),
}

impl EventType {
    /// Wire names kept compatible with the sandbox images that emit them.
    pub fn as_str(&self) -> &str {
        match self {
            EventType::FlagCaptured => "foundFlag_accepted",
            EventType::LevelCompleted => "level_completed",
            EventType::HintRequested => "hint_requested",
            EventType::Other(raw) => raw,
        }
    }

    pub fn parse(raw: &str) -> EventType {
        match raw {
            "foundFlag_accepted" => EventType::FlagCaptured,
            "level_completed" => EventType::LevelCompleted,
            "hint_requested" => EventType::HintRequested,
            other => EventType::Other(other.to_string()),
        }
    }
}

/// An immutable entry in the append-only gameplay event log.
///
/// A container's score is always recomputed from these rows, never mutated
/// independently, so replaying the log yields the same score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameEvent {
    pub id: Uuid,
    pub event_type: String,
    pub container_id: Uuid,
    pub point: Option<i64>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl GameEvent {
    /// Level key carried in the metadata of `level_completed` events.
    pub fn level_key(&self) -> Option<&str> {
        self.metadata
            .get("levelKey")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}
