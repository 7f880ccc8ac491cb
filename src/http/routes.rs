//! HTTP route definitions

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::arena::{ArenaError, MatchSummary, TankEntry};
use crate::game::ArenaLayout;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    // Comma-separated list in CLIENT_ORIGIN, any origin when unset
    let cors = match &state.config.client_origin {
        Some(origins) => {
            let allowed: Vec<header::HeaderValue> = origins
                .split(',')
                .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
                .collect();
            cors.allow_origin(allowed)
        }
        None => cors.allow_origin(Any),
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/tanks", get(tanks_handler))
        .route("/matches", get(list_matches_handler).post(start_match_handler))
        .route(
            "/matches/:id",
            get(get_match_handler).delete(end_match_handler),
        )
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    uptime_secs: u64,
    active_matches: usize,
    connected_tanks: usize,
    available_tanks: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: uptime_secs(),
        active_matches: state.arena.active_matches(),
        connected_tanks: state.arena.tank_count(),
        available_tanks: state.arena.available_tanks().len(),
    })
}

// ============================================================================
// Tank endpoints
// ============================================================================

async fn tanks_handler(State(state): State<AppState>) -> Json<Vec<TankEntry>> {
    Json(state.arena.tanks())
}

// ============================================================================
// Match endpoints
// ============================================================================

#[derive(Deserialize)]
struct StartMatchRequest {
    tank_a: Uuid,
    tank_b: Uuid,
    /// Identifies the caller so a repeat request replaces its previous match
    requester: Option<Uuid>,
}

#[derive(Serialize)]
struct StartMatchResponse {
    match_id: Uuid,
    requester: Uuid,
    tank_ids: [Uuid; 2],
    layout: ArenaLayout,
}

async fn list_matches_handler(State(state): State<AppState>) -> Json<Vec<MatchSummary>> {
    Json(state.arena.matches())
}

async fn start_match_handler(
    State(state): State<AppState>,
    Json(req): Json<StartMatchRequest>,
) -> Result<(StatusCode, Json<StartMatchResponse>), AppError> {
    let requester = req.requester.unwrap_or_else(Uuid::new_v4);
    let handle = state.arena.start_match(requester, req.tank_a, req.tank_b)?;

    Ok((
        StatusCode::CREATED,
        Json(StartMatchResponse {
            match_id: handle.id,
            requester,
            tank_ids: handle.tank_ids,
            layout: (*handle.layout).clone(),
        }),
    ))
}

async fn get_match_handler(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<MatchSummary>, AppError> {
    let handle = state
        .arena
        .get_match(match_id)
        .ok_or(ArenaError::MatchNotFound(match_id))?;
    Ok(Json(MatchSummary::from(&handle)))
}

async fn end_match_handler(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.arena.stop_match(match_id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ArenaError> for AppError {
    fn from(err: ArenaError) -> Self {
        let message = err.to_string();
        match err {
            ArenaError::UnknownTank(_) | ArenaError::MatchNotFound(_) => {
                AppError::NotFound(message)
            }
            ArenaError::TankBusy { .. } => AppError::Conflict(message),
            ArenaError::SameTank(_) | ArenaError::NotInMatch(_) | ArenaError::NoTank(_) => {
                AppError::BadRequest(message)
            }
            ArenaError::Simulation(_) => AppError::Internal(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
