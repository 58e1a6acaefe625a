use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::Session;

/// API error payload
#[derive(Serialize)]
pub struct ApiError {
    pub message: String,
}

/// POST /api/sessions
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateSessionBody {
    pub duration_secs: Option<i64>,
    pub max_players: Option<i64>,
    pub max_players_per_team: Option<i64>,
    pub team_count: Option<i64>,
    pub selected_levels: Vec<String>,
}

/// PATCH /api/sessions/:id/status
#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: String,
}

/// POST /api/join
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinBody {
    pub session_code: i64,
    pub nick_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub session_code: i64,
    pub nick_name: String,
    pub container_code: i64,
    pub terminal_url: Option<String>,
    pub team_mode: bool,
}

/// POST /api/events
///
/// The sender identifies itself by container code, by nick name, or not at
/// all; in the last case the source IP is matched against the attacker
/// containers on the game network.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventBody {
    pub container_code: Option<i64>,
    pub nick_name: Option<String>,
    pub event_type: String,
    pub point: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub event_id: Uuid,
    pub container_code: i64,
    pub total_score: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: Uuid,
    pub session_code: i64,
    pub duration_secs: i64,
    pub max_players: i64,
    pub max_players_per_team: i64,
    pub team_count: i64,
    pub selected_levels: Vec<String>,
    pub status: String,
    pub created_at: String,
    pub destroyed_at: Option<String>,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            session_code: session.session_code,
            duration_secs: session.duration_secs,
            max_players: session.max_players,
            max_players_per_team: session.max_players_per_team,
            team_count: session.team_count,
            selected_levels: session.selected_levels.clone(),
            status: session.status.as_str().to_string(),
            created_at: session.created_at.to_rfc3339(),
            destroyed_at: session.destroyed_at.map(|d| d.to_rfc3339()),
        }
    }
}

/// Result of a bulk attacker operation.
#[derive(Debug, Serialize)]
pub struct BulkResponse {
    pub matched: usize,
    pub succeeded: usize,
    pub failed: usize,
}
