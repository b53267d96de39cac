//! HTTP route definitions

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::matchmaking::OpenGame;
use crate::session::game_session::SessionSummary;
use crate::session::SessionError;
use crate::util::time::uptime_secs;
use crate::ws::handler::{game_ws_handler, lobby_ws_handler};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/games", get(open_games_handler))
        .route("/sessions/:id", get(session_handler))
        .route("/ws/lobby", get(lobby_ws_handler))
        .route("/ws/game", get(game_ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config.client_origin))
                .layer(CompressionLayer::new())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .with_state(state)
}

/// `*` allows any origin; otherwise a comma separated list with credentials
fn cors_layer(client_origin: &str) -> CorsLayer {
    let methods = [Method::GET, Method::OPTIONS];
    if client_origin.trim() == "*" {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE]);
    }

    let allowed_origins: Vec<HeaderValue> = client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(methods)
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_games: usize,
    games_started: u64,
    games_finished: u64,
    open_games: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.registry.stats();
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_games: stats.active_games,
        games_started: stats.games_started,
        games_finished: stats.games_finished,
        open_games: state.broker.open_game_count(),
    })
}

// ============================================================================
// Lobby and session views
// ============================================================================

async fn open_games_handler(State(state): State<AppState>) -> Json<Vec<OpenGame>> {
    Json(state.broker.open_games())
}

async fn session_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    let session = state
        .registry
        .get(id)
        .ok_or_else(|| AppError::NotFound(format!("game {}", id)))?;
    Ok(Json(session.summary().await))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::UnknownSession(_) => AppError::NotFound(e.to_string()),
            SessionError::Token(_) => AppError::Unauthorized,
            SessionError::Ended => AppError::Conflict(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::MemoryStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app_state() -> AppState {
        let config = Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "debug".to_string(),
            game_token_secret: "route-secret".to_string(),
            entry_timeout: Duration::from_secs(30),
            client_origin: "*".to_string(),
            store: None,
            seed_demo_admirals: false,
        };
        AppState::with_repository(Arc::new(config), Arc::new(MemoryStore::new()))
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_reports_counters() {
        let (status, body) = get_json(build_router(app_state()), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["active_games"], 0);
        assert_eq!(body["open_games"], 0);
    }

    #[tokio::test]
    async fn test_open_games_starts_empty() {
        let (status, body) = get_json(build_router(app_state()), "/games").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let uri = format!("/sessions/{}", Uuid::new_v4());
        let (status, body) = get_json(build_router(app_state()), &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("game"));
    }

    #[test]
    fn test_session_errors_map_to_statuses() {
        let unauthorized = AppError::from(SessionError::Token(
            crate::session::token::TokenError::Expired,
        ));
        assert_eq!(unauthorized.into_response().status(), StatusCode::UNAUTHORIZED);
        let ended = AppError::from(SessionError::Ended);
        assert_eq!(ended.into_response().status(), StatusCode::CONFLICT);
    }
}
