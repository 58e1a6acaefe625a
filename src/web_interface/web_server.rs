use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info};
use serde::Deserialize;
use uuid::Uuid;
use warp::reply::Response;
use warp::{http::StatusCode, reply, Filter, Rejection, Reply};

use crate::error_handling::types::{EventError, JoinError, SessionError, WebError};
use crate::join::JoinCoordinator;
use crate::reporting::Reporter;
use crate::runtime::ContainerRuntime;
use crate::scoring::ScoreEngine;
use crate::session_management::{CreateSessionRequest, SessionManager};
use crate::storage::{ContainerRecord, Database, SessionStatus};
use crate::web_interface::types::{
    ApiError, BulkResponse, CreateSessionBody, EventBody, EventResponse, JoinBody, JoinResponse,
    SessionResponse, StatusBody,
};

#[derive(Debug, Deserialize)]
struct PointsQuery {
    hint_penalty: Option<i64>,
}

/// Web server for the JSON API.
pub struct WebServer {
    api: Api,
    bind_address: String,
    port: u16,
}

/// Shared handles cloned into every route filter.
#[derive(Clone)]
struct Api {
    db: Database,
    manager: Arc<SessionManager>,
    coordinator: Arc<JoinCoordinator>,
    scoring: Arc<ScoreEngine>,
    reporter: Arc<Reporter>,
    runtime: Arc<dyn ContainerRuntime>,
}

impl WebServer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        manager: Arc<SessionManager>,
        coordinator: Arc<JoinCoordinator>,
        scoring: Arc<ScoreEngine>,
        reporter: Arc<Reporter>,
        runtime: Arc<dyn ContainerRuntime>,
        bind_address: String,
        port: u16,
    ) -> Self {
        Self {
            api: Api {
                db,
                manager,
                coordinator,
                scoring,
                reporter,
                runtime,
            },
            bind_address,
            port,
        }
    }

    /// Start the web server and serve until the process exits.
    pub async fn start(&self) -> Result<(), WebError> {
        let addr: SocketAddr = format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| WebError::BindFailed(format!("{}:{}: {}", self.bind_address, self.port, e)))?;

        // GET / -> minimal status page
        let dashboard = warp::path::end().and(warp::get()).and_then(|| async move {
            let html = r#"<html><head><title>MITS</title></head>
                <body><h1>MITS is running</h1><p>See /api/sessions for JSON.</p></body></html>"#;
            Ok::<_, Rejection>(reply::html(html))
        });

        // POST /api/sessions -> create a session
        let api = self.api.clone();
        let create_session = warp::path!("api" / "sessions")
            .and(warp::post())
            .and(warp::body::json())
            .and_then(move |body: CreateSessionBody| {
                let api = api.clone();
                async move { Ok::<_, Rejection>(api.create_session(body).await) }
            });

        // GET /api/sessions -> list all sessions, newest first
        let api = self.api.clone();
        let list_sessions = warp::path!("api" / "sessions")
            .and(warp::get())
            .and_then(move || {
                let api = api.clone();
                async move { Ok::<_, Rejection>(api.list_sessions().await) }
            });

        // DELETE /api/sessions -> wipe everything
        let api = self.api.clone();
        let delete_sessions = warp::path!("api" / "sessions")
            .and(warp::delete())
            .and_then(move || {
                let api = api.clone();
                async move { Ok::<_, Rejection>(api.delete_sessions().await) }
            });

        // GET /api/sessions/active -> the joinable session
        let api = self.api.clone();
        let active_session = warp::path!("api" / "sessions" / "active")
            .and(warp::get())
            .and_then(move || {
                let api = api.clone();
                async move { Ok::<_, Rejection>(api.active_session().await) }
            });

        // PATCH /api/sessions/:id/status -> start, pause or complete
        let api = self.api.clone();
        let update_status = warp::path!("api" / "sessions" / String / "status")
            .and(warp::patch())
            .and(warp::body::json())
            .and_then(move |id_str: String, body: StatusBody| {
                let api = api.clone();
                async move { Ok::<_, Rejection>(api.update_status(id_str, body).await) }
            });

        // GET /api/sessions/:id/leaderboard
        let api = self.api.clone();
        let leaderboard = warp::path!("api" / "sessions" / String / "leaderboard")
            .and(warp::get())
            .and_then(move |id_str: String| {
                let api = api.clone();
                async move { Ok::<_, Rejection>(api.leaderboard(id_str).await) }
            });

        // GET /api/sessions/:id/events -> recent activity feed
        let api = self.api.clone();
        let recent_events = warp::path!("api" / "sessions" / String / "events")
            .and(warp::get())
            .and_then(move |id_str: String| {
                let api = api.clone();
                async move { Ok::<_, Rejection>(api.recent_events(id_str).await) }
            });

        // POST /api/join -> player admission
        let api = self.api.clone();
        let join = warp::path!("api" / "join")
            .and(warp::post())
            .and(warp::body::json())
            .and_then(move |body: JoinBody| {
                let api = api.clone();
                async move { Ok::<_, Rejection>(api.join(body).await) }
            });

        // POST /api/events -> gameplay event ingest
        let api = self.api.clone();
        let post_event = warp::path!("api" / "events")
            .and(warp::post())
            .and(warp::body::json())
            .and(warp::addr::remote())
            .and_then(move |body: EventBody, remote: Option<SocketAddr>| {
                let api = api.clone();
                async move { Ok::<_, Rejection>(api.record_event(body, remote).await) }
            });

        // GET /api/sessions/:id/points -> per-container score decomposition
        let api = self.api.clone();
        let points = warp::path!("api" / "sessions" / String / "points")
            .and(warp::get())
            .and(warp::query::<PointsQuery>())
            .and_then(move |id_str: String, query: PointsQuery| {
                let api = api.clone();
                async move { Ok::<_, Rejection>(api.point_distribution(id_str, query).await) }
            });

        // POST /api/containers/:action -> bulk attacker stop/start/remove
        let api = self.api.clone();
        let bulk = warp::path!("api" / "containers" / String)
            .and(warp::post())
            .and_then(move |action: String| {
                let api = api.clone();
                async move { Ok::<_, Rejection>(api.bulk_attackers(action).await) }
            });

        let routes = dashboard
            .or(create_session)
            .or(active_session)
            .or(list_sessions)
            .or(delete_sessions)
            .or(update_status)
            .or(leaderboard)
            .or(recent_events)
            .or(join)
            .or(post_event)
            .or(points)
            .or(bulk);

        info!("web interface listening on {}", addr);
        warp::serve(routes).run(addr).await;
        Ok(())
    }
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    reply::with_status(
        reply::json(&ApiError {
            message: message.into(),
        }),
        status,
    )
    .into_response()
}

impl Api {
    async fn create_session(&self, body: CreateSessionBody) -> Response {
        let request = CreateSessionRequest {
            duration_secs: body.duration_secs,
            max_players: body.max_players,
            max_players_per_team: body.max_players_per_team,
            team_count: body.team_count,
            selected_levels: body.selected_levels,
        };
        match self.manager.create_session(request).await {
            Ok(session) => reply::with_status(
                reply::json(&SessionResponse::from(&session)),
                StatusCode::CREATED,
            )
            .into_response(),
            Err(SessionError::Validation(msg)) => json_error(StatusCode::BAD_REQUEST, msg),
            Err(e) => {
                error!("session creation failed: {}", e);
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session")
            }
        }
    }

    async fn list_sessions(&self) -> Response {
        match self.manager.list_sessions().await {
            Ok(sessions) => {
                let payload: Vec<SessionResponse> =
                    sessions.iter().map(SessionResponse::from).collect();
                reply::with_status(reply::json(&payload), StatusCode::OK).into_response()
            }
            Err(e) => {
                error!("failed to list sessions: {}", e);
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load sessions")
            }
        }
    }

    async fn delete_sessions(&self) -> Response {
        match self.manager.delete_all_sessions().await {
            Ok(()) => reply::with_status(reply::json(&serde_json::json!({ "deleted": true })), StatusCode::OK)
                .into_response(),
            Err(e) => {
                error!("failed to delete sessions: {}", e);
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete sessions")
            }
        }
    }

    async fn active_session(&self) -> Response {
        match self.reporter.joinable_session().await {
            Ok(Some(summary)) => {
                reply::with_status(reply::json(&summary), StatusCode::OK).into_response()
            }
            Ok(None) => json_error(StatusCode::NOT_FOUND, "No joinable session"),
            Err(e) => {
                error!("failed to load active session: {}", e);
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load session")
            }
        }
    }

    async fn update_status(&self, id_str: String, body: StatusBody) -> Response {
        let id = match Uuid::parse_str(&id_str) {
            Ok(u) => u,
            Err(_) => return json_error(StatusCode::BAD_REQUEST, "Invalid session id"),
        };
        let Some(status) = SessionStatus::parse(&body.status) else {
            return json_error(
                StatusCode::BAD_REQUEST,
                format!("Unknown status '{}'", body.status),
            );
        };
        match self.manager.update_status(id, status).await {
            Ok(session) => reply::with_status(
                reply::json(&SessionResponse::from(&session)),
                StatusCode::OK,
            )
            .into_response(),
            Err(SessionError::NotFound(_)) => json_error(StatusCode::NOT_FOUND, "Session not found"),
            Err(e @ SessionError::InvalidTransition { .. }) => {
                json_error(StatusCode::CONFLICT, e.to_string())
            }
            Err(e) => {
                error!("status update failed: {}", e);
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update session")
            }
        }
    }

    async fn leaderboard(&self, id_str: String) -> Response {
        let id = match Uuid::parse_str(&id_str) {
            Ok(u) => u,
            Err(_) => return json_error(StatusCode::BAD_REQUEST, "Invalid session id"),
        };
        match self.reporter.leaderboard(id).await {
            Ok(board) => reply::with_status(reply::json(&board), StatusCode::OK).into_response(),
            Err(e) => {
                error!("failed to build leaderboard: {}", e);
                json_error(StatusCode::NOT_FOUND, "Session not found")
            }
        }
    }

    async fn recent_events(&self, id_str: String) -> Response {
        let id = match Uuid::parse_str(&id_str) {
            Ok(u) => u,
            Err(_) => return json_error(StatusCode::BAD_REQUEST, "Invalid session id"),
        };
        match self.reporter.recent_events(id).await {
            Ok(feed) => reply::with_status(reply::json(&feed), StatusCode::OK).into_response(),
            Err(e) => {
                error!("failed to load events: {}", e);
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load events")
            }
        }
    }

    async fn join(&self, body: JoinBody) -> Response {
        match self.coordinator.join(body.session_code, &body.nick_name).await {
            Ok(outcome) => reply::with_status(
                reply::json(&JoinResponse {
                    session_code: outcome.session.session_code,
                    nick_name: outcome.user.nick_name,
                    container_code: outcome.container.container_code,
                    terminal_url: outcome.container.container_url,
                    team_mode: outcome.session.is_team_mode(),
                }),
                StatusCode::OK,
            )
            .into_response(),
            Err(e @ JoinError::SessionNotFound(_)) => {
                json_error(StatusCode::NOT_FOUND, e.to_string())
            }
            Err(e @ (JoinError::SessionFull | JoinError::DuplicateName(_))) => {
                json_error(StatusCode::CONFLICT, e.to_string())
            }
            Err(e @ JoinError::BadNameLength(_)) => {
                json_error(StatusCode::BAD_REQUEST, e.to_string())
            }
            Err(e) => {
                error!("join failed: {}", e);
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to join session")
            }
        }
    }

    async fn record_event(&self, body: EventBody, remote: Option<SocketAddr>) -> Response {
        if body.event_type.is_empty() {
            return json_error(StatusCode::BAD_REQUEST, "Missing event type");
        }
        let container = match self.resolve_event_source(&body, remote).await {
            Ok(container) => container,
            Err(EventError::ContainerNotFound(id)) => {
                return json_error(
                    StatusCode::NOT_FOUND,
                    format!("No container for event: {}", id),
                )
            }
            Err(EventError::UnknownSource(msg)) => {
                return json_error(StatusCode::BAD_REQUEST, msg)
            }
            Err(e) => {
                error!("event attribution failed: {}", e);
                return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to record event");
            }
        };

        let metadata = body.metadata.unwrap_or_else(|| serde_json::json!({}));
        match self
            .scoring
            .record_event(container.id, &body.event_type, body.point, metadata)
            .await
        {
            Ok(event) => {
                let total_score = match self.db.container_by_id(container.id).await {
                    Ok(Some(refreshed)) => refreshed.total_score,
                    _ => container.total_score,
                };
                reply::with_status(
                    reply::json(&EventResponse {
                        event_id: event.id,
                        container_code: container.container_code,
                        total_score,
                    }),
                    StatusCode::CREATED,
                )
                .into_response()
            }
            Err(e) => {
                error!("failed to record event: {}", e);
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to record event")
            }
        }
    }

    /// Attributes an incoming event to a container: explicit code first,
    /// then nick name within the live session, then the source IP.
    async fn resolve_event_source(
        &self,
        body: &EventBody,
        remote: Option<SocketAddr>,
    ) -> Result<ContainerRecord, EventError> {
        if let Some(code) = body.container_code {
            return self
                .db
                .container_by_code(code)
                .await?
                .ok_or_else(|| EventError::ContainerNotFound(code.to_string()));
        }
        if let Some(ref nick) = body.nick_name {
            let session = self
                .db
                .active_or_pending_session()
                .await?
                .ok_or_else(|| EventError::UnknownSource("No live session".to_string()))?;
            return self
                .db
                .container_by_nickname(session.id, nick)
                .await?
                .ok_or_else(|| EventError::ContainerNotFound(nick.clone()));
        }
        let Some(addr) = remote else {
            return Err(EventError::UnknownSource(
                "Event carries no container code, nick name or source address".to_string(),
            ));
        };
        let ip = addr.ip().to_string();
        let runtime_id = self
            .runtime
            .attacker_for_ip(&ip)
            .await
            .map_err(|e| EventError::UnknownSource(e.to_string()))?
            .ok_or_else(|| EventError::UnknownSource(format!("No attacker at {}", ip)))?;
        self.db
            .container_by_runtime_id(&runtime_id)
            .await?
            .ok_or_else(|| EventError::ContainerNotFound(runtime_id))
    }

    async fn point_distribution(&self, id_str: String, query: PointsQuery) -> Response {
        let id = match Uuid::parse_str(&id_str) {
            Ok(u) => u,
            Err(_) => return json_error(StatusCode::BAD_REQUEST, "Invalid session id"),
        };
        match self
            .scoring
            .session_point_distribution(id, query.hint_penalty)
            .await
        {
            Ok(distribution) => {
                reply::with_status(reply::json(&distribution), StatusCode::OK).into_response()
            }
            Err(e) => {
                error!("point distribution failed: {}", e);
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to compute points")
            }
        }
    }

    async fn bulk_attackers(&self, action: String) -> Response {
        let result = match action.as_str() {
            "attacker-stop" => self.runtime.stop_attackers().await,
            "attacker-start" => self.runtime.start_attackers().await,
            "attacker-remove" => self.runtime.remove_attackers().await,
            other => {
                return json_error(
                    StatusCode::BAD_REQUEST,
                    format!("Unknown bulk action '{}'", other),
                )
            }
        };
        match result {
            Ok(outcome) => reply::with_status(
                reply::json(&BulkResponse {
                    matched: outcome.matched,
                    succeeded: outcome.succeeded(),
                    failed: outcome.failed,
                }),
                StatusCode::OK,
            )
            .into_response(),
            Err(e) => {
                error!("bulk {} failed: {}", action, e);
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "Bulk operation failed")
            }
        }
    }
}
