use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use crate::error_handling::types::StorageError;
use crate::storage::types::{
    ContainerRecord, ContainerStatus, GameEvent, Level, Session, SessionStatus, User,
};

// Internal row mappings to avoid manual try_get on every column.
#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: String,
    session_code: i64,
    duration_secs: i64,
    max_players: i64,
    max_players_per_team: i64,
    team_count: i64,
    selected_levels: String,
    status: String,
    created_at: String,
    destroyed_at: Option<String>,
}

impl SessionRow {
    fn into_session(self) -> Result<Session, StorageError> {
        Ok(Session {
            id: parse_uuid(&self.id)?,
            session_code: self.session_code,
            duration_secs: self.duration_secs,
            max_players: self.max_players,
            max_players_per_team: self.max_players_per_team,
            team_count: self.team_count,
            selected_levels: if self.selected_levels.is_empty() {
                Vec::new()
            } else {
                self.selected_levels
                    .split(',')
                    .map(|s| s.to_string())
                    .collect()
            },
            status: SessionStatus::parse(&self.status)
                .ok_or_else(|| StorageError::ReadFailed(format!("bad status: {}", self.status)))?,
            created_at: parse_ts(&self.created_at)?,
            destroyed_at: self.destroyed_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ContainerRow {
    id: String,
    container_code: i64,
    container_url: Option<String>,
    session_id: String,
    user_connected_count: i64,
    total_score: i64,
    hint_used: i64,
    runtime_id: Option<String>,
    status: String,
}

impl ContainerRow {
    fn into_container(self) -> Result<ContainerRecord, StorageError> {
        Ok(ContainerRecord {
            id: parse_uuid(&self.id)?,
            container_code: self.container_code,
            container_url: self.container_url,
            session_id: parse_uuid(&self.session_id)?,
            user_connected_count: self.user_connected_count,
            total_score: self.total_score,
            hint_used: self.hint_used,
            runtime_id: self.runtime_id,
            status: ContainerStatus::parse(&self.status)
                .ok_or_else(|| StorageError::ReadFailed(format!("bad status: {}", self.status)))?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LevelRow {
    id: String,
    session_id: String,
    level_key: String,
    service_name: String,
    points: i64,
}

impl LevelRow {
    fn into_level(self) -> Result<Level, StorageError> {
        Ok(Level {
            id: parse_uuid(&self.id)?,
            session_id: parse_uuid(&self.session_id)?,
            level_key: self.level_key,
            service_name: self.service_name,
            points: self.points,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: String,
    event_type: String,
    container_id: String,
    point: Option<i64>,
    metadata: String,
    created_at: String,
}

impl EventRow {
    fn into_event(self) -> Result<GameEvent, StorageError> {
        Ok(GameEvent {
            id: parse_uuid(&self.id)?,
            event_type: self.event_type,
            container_id: parse_uuid(&self.container_id)?,
            point: self.point,
            metadata: serde_json::from_str(&self.metadata)
                .map_err(|e| StorageError::ReadFailed(e.to_string()))?,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(raw).map_err(|e| StorageError::ReadFailed(e.to_string()))
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::ReadFailed(e.to_string()))
}

/// Async SQLite store for the range's relational state.
///
/// Clones share the same connection pool. The schema is created when the
/// database is opened, so a fresh file is immediately usable.
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
            }
        }
        let opts = SqliteConnectOptions::new()
            .filename(path_ref)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
        let db = Self { pool };
        db.create_schema().await?;
        Ok(db)
    }

    /// Private in-memory database, used by tests.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
        // A single connection so every query sees the same memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
        let db = Self { pool };
        db.create_schema().await?;
        Ok(db)
    }

    async fn create_schema(&self) -> Result<(), StorageError> {
        let statements = [
            "PRAGMA foreign_keys = ON;",
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                session_code INTEGER NOT NULL,
                duration_secs INTEGER NOT NULL,
                max_players INTEGER NOT NULL,
                max_players_per_team INTEGER NOT NULL,
                team_count INTEGER NOT NULL,
                selected_levels TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                destroyed_at TEXT
            );",
            "CREATE TABLE IF NOT EXISTS levels (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                level_key TEXT NOT NULL,
                service_name TEXT NOT NULL UNIQUE,
                points INTEGER NOT NULL,
                FOREIGN KEY(session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );",
            "CREATE TABLE IF NOT EXISTS containers (
                id TEXT PRIMARY KEY,
                container_code INTEGER NOT NULL,
                container_url TEXT,
                session_id TEXT NOT NULL,
                user_connected_count INTEGER NOT NULL,
                total_score INTEGER NOT NULL,
                hint_used INTEGER NOT NULL,
                runtime_id TEXT,
                status TEXT NOT NULL,
                FOREIGN KEY(session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );",
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                nick_name TEXT NOT NULL,
                container_id TEXT NOT NULL,
                FOREIGN KEY(container_id) REFERENCES containers(id) ON DELETE CASCADE
            );",
            "CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                event_type TEXT NOT NULL,
                container_id TEXT NOT NULL,
                point INTEGER,
                metadata TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY(container_id) REFERENCES containers(id) ON DELETE CASCADE
            );",
        ];
        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        }
        Ok(())
    }

    // --- sessions ---

    pub async fn insert_session(&self, session: &Session) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO sessions (id, session_code, duration_secs, max_players,
                max_players_per_team, team_count, selected_levels, status, created_at, destroyed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(session.id.to_string())
        .bind(session.session_code)
        .bind(session.duration_secs)
        .bind(session.max_players)
        .bind(session.max_players_per_team)
        .bind(session.team_count)
        .bind(session.selected_levels.join(","))
        .bind(session.status.as_str())
        .bind(session.created_at.to_rfc3339())
        .bind(session.destroyed_at.map(|d| d.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    pub async fn session_by_id(&self, id: Uuid) -> Result<Option<Session>, StorageError> {
        let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(SessionRow::into_session).transpose()
    }

    /// Session lookup by join code, restricted to non-terminal sessions.
    pub async fn session_by_code_live(&self, code: i64) -> Result<Option<Session>, StorageError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM sessions
             WHERE session_code = ?1 AND status IN ('pending', 'active')
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SessionRow::into_session).transpose()
    }

    /// Whether a join code is already taken by a non-terminal session.
    pub async fn session_code_live(&self, code: i64) -> Result<bool, StorageError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sessions
             WHERE session_code = ?1 AND status IN ('pending', 'active')",
        )
        .bind(code)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// The most recent non-terminal session, if any.
    pub async fn active_or_pending_session(&self) -> Result<Option<Session>, StorageError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM sessions
             WHERE status IN ('pending', 'active')
             ORDER BY created_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        row.map(SessionRow::into_session).transpose()
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>, StorageError> {
        let rows =
            sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(SessionRow::into_session).collect()
    }

    pub async fn set_session_status(
        &self,
        id: Uuid,
        status: SessionStatus,
    ) -> Result<(), StorageError> {
        let destroyed_at = if status.is_terminal() {
            Some(Utc::now().to_rfc3339())
        } else {
            None
        };
        let affected = sqlx::query(
            "UPDATE sessions SET status = ?1, destroyed_at = COALESCE(?2, destroyed_at)
             WHERE id = ?3",
        )
        .bind(status.as_str())
        .bind(destroyed_at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::WriteFailed(e.to_string()))?
        .rows_affected();
        if affected == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Force-completes every pending/active session and returns their ids.
    pub async fn terminate_live_sessions(&self) -> Result<Vec<Uuid>, StorageError> {
        let ids: Vec<(String,)> = sqlx::query_as(
            "SELECT id FROM sessions WHERE status IN ('pending', 'active')",
        )
        .fetch_all(&self.pool)
        .await?;
        sqlx::query(
            "UPDATE sessions SET status = 'completed', destroyed_at = ?1
             WHERE status IN ('pending', 'active')",
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        ids.into_iter().map(|(id,)| parse_uuid(&id)).collect()
    }

    /// Bulk clear: removes every session and, through cascading foreign
    /// keys, their levels, containers, users and events.
    pub async fn delete_all_sessions(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM sessions")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    // --- levels ---

    pub async fn insert_level(&self, level: &Level) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO levels (id, session_id, level_key, service_name, points)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(service_name) DO NOTHING",
        )
        .bind(level.id.to_string())
        .bind(level.session_id.to_string())
        .bind(&level.level_key)
        .bind(&level.service_name)
        .bind(level.points)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    pub async fn levels_for_session(&self, session_id: Uuid) -> Result<Vec<Level>, StorageError> {
        let rows = sqlx::query_as::<_, LevelRow>(
            "SELECT * FROM levels WHERE session_id = ?1 ORDER BY level_key ASC",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LevelRow::into_level).collect()
    }

    /// Completion points for a level key within a session. Matches the
    /// generated service name exactly or by substring, mirroring how event
    /// sources may report either form. Returns 0 when unresolved.
    pub async fn level_completion_point(
        &self,
        session_id: Uuid,
        level_key: &str,
    ) -> Result<i64, StorageError> {
        let key = level_key.trim();
        if key.is_empty() {
            return Ok(0);
        }
        let points: Option<i64> = sqlx::query_scalar(
            "SELECT points FROM levels
             WHERE session_id = ?1
               AND (service_name = ?2 OR service_name LIKE '%' || ?2 || '%')
             LIMIT 1",
        )
        .bind(session_id.to_string())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(points.unwrap_or(0))
    }

    // --- containers ---

    pub async fn insert_container(&self, container: &ContainerRecord) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO containers (id, container_code, container_url, session_id,
                user_connected_count, total_score, hint_used, runtime_id, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(container.id.to_string())
        .bind(container.container_code)
        .bind(container.container_url.clone())
        .bind(container.session_id.to_string())
        .bind(container.user_connected_count)
        .bind(container.total_score)
        .bind(container.hint_used)
        .bind(container.runtime_id.clone())
        .bind(container.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    pub async fn container_by_id(&self, id: Uuid) -> Result<Option<ContainerRecord>, StorageError> {
        let row = sqlx::query_as::<_, ContainerRow>("SELECT * FROM containers WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(ContainerRow::into_container).transpose()
    }

    pub async fn container_by_code(
        &self,
        code: i64,
    ) -> Result<Option<ContainerRecord>, StorageError> {
        let row = sqlx::query_as::<_, ContainerRow>(
            "SELECT * FROM containers WHERE container_code = ?1 LIMIT 1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ContainerRow::into_container).transpose()
    }

    pub async fn container_by_runtime_id(
        &self,
        runtime_id: &str,
    ) -> Result<Option<ContainerRecord>, StorageError> {
        let row = sqlx::query_as::<_, ContainerRow>(
            "SELECT * FROM containers WHERE runtime_id = ?1 LIMIT 1",
        )
        .bind(runtime_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ContainerRow::into_container).transpose()
    }

    pub async fn container_by_nickname(
        &self,
        session_id: Uuid,
        nick_name: &str,
    ) -> Result<Option<ContainerRecord>, StorageError> {
        let row = sqlx::query_as::<_, ContainerRow>(
            "SELECT c.* FROM containers c
             JOIN users u ON u.container_id = c.id
             WHERE c.session_id = ?1 AND LOWER(u.nick_name) = LOWER(?2)
             LIMIT 1",
        )
        .bind(session_id.to_string())
        .bind(nick_name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ContainerRow::into_container).transpose()
    }

    pub async fn containers_for_session(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<ContainerRecord>, StorageError> {
        let rows = sqlx::query_as::<_, ContainerRow>(
            "SELECT * FROM containers WHERE session_id = ?1 ORDER BY total_score DESC",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ContainerRow::into_container).collect()
    }

    /// The least-occupied joinable container still below `capacity`.
    pub async fn available_container(
        &self,
        session_id: Uuid,
        capacity: i64,
    ) -> Result<Option<ContainerRecord>, StorageError> {
        let row = sqlx::query_as::<_, ContainerRow>(
            "SELECT * FROM containers
             WHERE session_id = ?1
               AND user_connected_count < ?2
               AND status IN ('creating', 'started', 'healthy')
             ORDER BY user_connected_count ASC
             LIMIT 1",
        )
        .bind(session_id.to_string())
        .bind(capacity)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ContainerRow::into_container).transpose()
    }

    pub async fn set_container_status(
        &self,
        id: Uuid,
        status: ContainerStatus,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE containers SET status = ?1 WHERE id = ?2")
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    /// Records the runtime endpoint once the engine reports it reachable.
    pub async fn set_container_endpoint(
        &self,
        id: Uuid,
        runtime_id: &str,
        url: &str,
        status: ContainerStatus,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE containers SET runtime_id = ?1, container_url = ?2, status = ?3
             WHERE id = ?4",
        )
        .bind(runtime_id)
        .bind(url)
        .bind(status.as_str())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    pub async fn increment_user_count(&self, id: Uuid) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE containers SET user_connected_count = user_connected_count + 1
             WHERE id = ?1",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    pub async fn update_scores(
        &self,
        id: Uuid,
        total_score: i64,
        hint_used: i64,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE containers SET total_score = ?1, hint_used = ?2 WHERE id = ?3")
            .bind(total_score)
            .bind(hint_used)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    /// Marks every container of a session as removed. The runtime teardown
    /// happens separately; rows are kept for history.
    pub async fn mark_session_containers_removed(
        &self,
        session_id: Uuid,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE containers SET status = 'removed' WHERE session_id = ?1")
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    /// Total connected players across a session's containers.
    pub async fn session_player_count(&self, session_id: Uuid) -> Result<i64, StorageError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(user_connected_count), 0) FROM containers
             WHERE session_id = ?1",
        )
        .bind(session_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn container_count(&self, session_id: Uuid) -> Result<i64, StorageError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM containers WHERE session_id = ?1")
                .bind(session_id.to_string())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    // --- users ---

    pub async fn insert_user(&self, user: &User) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO users (id, nick_name, container_id) VALUES (?1, ?2, ?3)")
            .bind(user.id.to_string())
            .bind(&user.nick_name)
            .bind(user.container_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    /// Case-insensitive duplicate check within one session.
    pub async fn nickname_taken(
        &self,
        session_id: Uuid,
        nick_name: &str,
    ) -> Result<bool, StorageError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users u
             JOIN containers c ON u.container_id = c.id
             WHERE c.session_id = ?1 AND LOWER(u.nick_name) = LOWER(?2)",
        )
        .bind(session_id.to_string())
        .bind(nick_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Comma-separated nick names of a container's players (join order).
    pub async fn player_names(&self, container_id: Uuid) -> Result<Vec<String>, StorageError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT nick_name FROM users WHERE container_id = ?1 ORDER BY rowid ASC",
        )
        .bind(container_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    // --- events ---

    pub async fn insert_event(&self, event: &GameEvent) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO events (id, event_type, container_id, point, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(event.id.to_string())
        .bind(&event.event_type)
        .bind(event.container_id.to_string())
        .bind(event.point)
        .bind(event.metadata.to_string())
        .bind(event.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    /// Full ordered event history for one container.
    pub async fn events_for_container(
        &self,
        container_id: Uuid,
    ) -> Result<Vec<GameEvent>, StorageError> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT * FROM events WHERE container_id = ?1 ORDER BY created_at ASC, id ASC",
        )
        .bind(container_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(EventRow::into_event).collect()
    }

    /// Most-recent-first bounded feed for a session.
    pub async fn recent_events(
        &self,
        session_id: Uuid,
        limit: i64,
    ) -> Result<Vec<(GameEvent, i64)>, StorageError> {
        let rows = sqlx::query_as::<_, EventWithCodeRow>(
            "SELECT e.id, e.event_type, e.container_id, e.point, e.metadata, e.created_at,
                    c.container_code
             FROM events e
             JOIN containers c ON e.container_id = c.id
             WHERE c.session_id = ?1
             ORDER BY e.created_at DESC, e.id DESC
             LIMIT ?2",
        )
        .bind(session_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                let code = row.container_code;
                row.into_event().map(|event| (event, code))
            })
            .collect()
    }

    /// Distinct levels a container has completed, keyed on the level key
    /// carried in the event metadata.
    pub async fn levels_completed_count(&self, container_id: Uuid) -> Result<i64, StorageError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT json_extract(metadata, '$.levelKey')) FROM events
             WHERE container_id = ?1 AND event_type = 'level_completed'",
        )
        .bind(container_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EventWithCodeRow {
    id: String,
    event_type: String,
    container_id: String,
    point: Option<i64>,
    metadata: String,
    created_at: String,
    container_code: i64,
}

impl EventWithCodeRow {
    fn into_event(self) -> Result<GameEvent, StorageError> {
        EventRow {
            id: self.id,
            event_type: self.event_type,
            container_id: self.container_id,
            point: self.point,
            metadata: self.metadata,
            created_at: self.created_at,
        }
        .into_event()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::EventType;

    fn sample_session(code: i64) -> Session {
        Session {
            id: Uuid::new_v4(),
            session_code: code,
            duration_secs: 3600,
            max_players: 10,
            max_players_per_team: 1,
            team_count: 0,
            selected_levels: vec!["level1".into(), "level2".into()],
            status: SessionStatus::Pending,
            created_at: Utc::now(),
            destroyed_at: None,
        }
    }

    fn sample_container(session_id: Uuid, code: i64) -> ContainerRecord {
        ContainerRecord {
            id: Uuid::new_v4(),
            container_code: code,
            container_url: None,
            session_id,
            user_connected_count: 0,
            total_score: 0,
            hint_used: 0,
            runtime_id: None,
            status: ContainerStatus::Creating,
        }
    }

    #[tokio::test]
    async fn session_round_trip() {
        let db = Database::in_memory().await.unwrap();
        let session = sample_session(123456);
        db.insert_session(&session).await.unwrap();

        let fetched = db.session_by_id(session.id).await.unwrap().unwrap();
        assert_eq!(fetched.session_code, 123456);
        assert_eq!(fetched.selected_levels, vec!["level1", "level2"]);
        assert_eq!(fetched.status, SessionStatus::Pending);

        assert!(db.session_code_live(123456).await.unwrap());
        assert!(!db.session_code_live(654321).await.unwrap());
    }

    #[tokio::test]
    async fn live_session_lookup_ignores_completed() {
        let db = Database::in_memory().await.unwrap();
        let session = sample_session(111111);
        db.insert_session(&session).await.unwrap();
        assert!(db.session_by_code_live(111111).await.unwrap().is_some());

        db.set_session_status(session.id, SessionStatus::Completed)
            .await
            .unwrap();
        assert!(db.session_by_code_live(111111).await.unwrap().is_none());
        assert!(db.active_or_pending_session().await.unwrap().is_none());

        let fetched = db.session_by_id(session.id).await.unwrap().unwrap();
        assert!(fetched.destroyed_at.is_some());
    }

    #[tokio::test]
    async fn terminate_live_sessions_returns_ids() {
        let db = Database::in_memory().await.unwrap();
        let session = sample_session(222222);
        db.insert_session(&session).await.unwrap();

        let ids = db.terminate_live_sessions().await.unwrap();
        assert_eq!(ids, vec![session.id]);
        assert!(db.terminate_live_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn available_container_picks_least_occupied() {
        let db = Database::in_memory().await.unwrap();
        let session = sample_session(333333);
        db.insert_session(&session).await.unwrap();

        let mut first = sample_container(session.id, 10000001);
        first.user_connected_count = 2;
        let mut second = sample_container(session.id, 10000002);
        second.user_connected_count = 1;
        let mut full = sample_container(session.id, 10000003);
        full.user_connected_count = 3;
        db.insert_container(&first).await.unwrap();
        db.insert_container(&second).await.unwrap();
        db.insert_container(&full).await.unwrap();

        let picked = db.available_container(session.id, 3).await.unwrap().unwrap();
        assert_eq!(picked.id, second.id);

        // Stopped containers are not joinable even with room.
        db.set_container_status(second.id, ContainerStatus::Stopped)
            .await
            .unwrap();
        let picked = db.available_container(session.id, 3).await.unwrap().unwrap();
        assert_eq!(picked.id, first.id);
    }

    #[tokio::test]
    async fn nickname_uniqueness_is_case_insensitive() {
        let db = Database::in_memory().await.unwrap();
        let session = sample_session(444444);
        db.insert_session(&session).await.unwrap();
        let container = sample_container(session.id, 10000004);
        db.insert_container(&container).await.unwrap();

        db.insert_user(&User {
            id: Uuid::new_v4(),
            nick_name: "alice".into(),
            container_id: container.id,
        })
        .await
        .unwrap();

        assert!(db.nickname_taken(session.id, "Alice").await.unwrap());
        assert!(db.nickname_taken(session.id, "ALICE").await.unwrap());
        assert!(!db.nickname_taken(session.id, "bob").await.unwrap());
    }

    #[tokio::test]
    async fn level_point_matches_exact_and_partial() {
        let db = Database::in_memory().await.unwrap();
        let session = sample_session(555555);
        db.insert_session(&session).await.unwrap();
        db.insert_level(&Level {
            id: Uuid::new_v4(),
            session_id: session.id,
            level_key: "level1".into(),
            service_name: Level::service_name_for(555555, "level1"),
            points: 100,
        })
        .await
        .unwrap();

        assert_eq!(
            db.level_completion_point(session.id, "mits-s555555-level1")
                .await
                .unwrap(),
            100
        );
        assert_eq!(
            db.level_completion_point(session.id, "level1").await.unwrap(),
            100
        );
        assert_eq!(
            db.level_completion_point(session.id, "level9").await.unwrap(),
            0
        );
        assert_eq!(db.level_completion_point(session.id, " ").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_all_sessions_cascades() {
        let db = Database::in_memory().await.unwrap();
        let session = sample_session(666666);
        db.insert_session(&session).await.unwrap();
        let container = sample_container(session.id, 10000005);
        db.insert_container(&container).await.unwrap();
        db.insert_event(&GameEvent {
            id: Uuid::new_v4(),
            event_type: EventType::FlagCaptured.as_str().to_string(),
            container_id: container.id,
            point: Some(10),
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

        db.delete_all_sessions().await.unwrap();
        assert!(db.list_sessions().await.unwrap().is_empty());
        assert!(db.container_by_id(container.id).await.unwrap().is_none());
        assert!(db.events_for_container(container.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_backed_database_opens() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("range.sqlite3");
        let db = Database::open(&path).await.unwrap();
        db.insert_session(&sample_session(777777)).await.unwrap();
        assert_eq!(db.list_sessions().await.unwrap().len(), 1);
    }
}
