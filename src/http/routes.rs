//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::app::AppState;
use crate::game::{SessionError, SessionSummary};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/sessions", get(sessions_handler))
        .route("/play", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.client_origins))
        .with_state(state)
}

/// CORS for the listed origins, or any origin when none are configured
fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring unparsable CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(allowed)
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_sessions: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let (status, active_sessions) = match state.registry.list().await {
        Ok(sessions) => ("ok", sessions.len()),
        Err(_) => ("degraded", 0),
    };

    Json(HealthResponse {
        status,
        uptime_secs: uptime_secs(),
        active_sessions,
    })
}

/// Session discovery: `[{"id": .., "numPlayers": ..}]`
async fn sessions_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<SessionSummary>>, AppError> {
    let mut sessions = state.registry.list().await?;
    sessions.sort_by_key(|s| s.id);
    Ok(Json(sessions))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::RegistryUnavailable => AppError::Unavailable(e.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
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
    use crate::game::controller::Controller;
    use tokio::sync::mpsc;
    use tokio_test::assert_ok;

    fn state() -> AppState {
        AppState::new(Config::from_lookup(|_| None).unwrap())
    }

    #[tokio::test]
    async fn test_sessions_lists_live_sessions() {
        let state = state();
        let (tx, _rx) = mpsc::channel(64);
        assert_ok!(state.registry.join(8, Controller::network(tx.clone()), false).await);
        assert_ok!(state.registry.join(2, Controller::network(tx), false).await);

        let Json(sessions) = assert_ok!(sessions_handler(State(state)).await);
        let ids: Vec<_> = sessions.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 8]);

        let json = serde_json::to_value(&sessions[0]).unwrap();
        assert_eq!(json, serde_json::json!({ "id": 2, "numPlayers": 1 }));
    }

    #[tokio::test]
    async fn test_health_counts_sessions() {
        let state = state();
        let Json(health) = health_handler(State(state.clone())).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.active_sessions, 0);

        let (tx, _rx) = mpsc::channel(64);
        assert_ok!(state.registry.join(1, Controller::network(tx), true).await);
        let Json(health) = health_handler(State(state)).await;
        assert_eq!(health.active_sessions, 1);
    }

    #[test]
    fn test_registry_failure_maps_to_503() {
        let response = AppError::from(SessionError::RegistryUnavailable).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = AppError::from(SessionError::Full(3)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
