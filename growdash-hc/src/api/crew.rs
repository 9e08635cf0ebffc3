//! Crew roster handlers
//!
//! POST /sessions/:id/crew/join, /crew/force-join, /crew/leave

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use growdash_common::harvest::{CrewMembership, CrewRole, SessionId};
use serde::{Deserialize, Serialize};

use super::operator::Caller;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: CrewRole,
}

/// Active crew after a roster operation
#[derive(Debug, Serialize)]
pub struct CrewResponse {
    pub session_id: SessionId,
    pub crew: Vec<CrewMembership>,
}

/// POST /sessions/:id/crew/join
///
/// 409 ROLE_CONFLICT (with `current_holder`) when weighing is taken.
pub async fn join(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Caller(operator): Caller,
    Json(request): Json<RoleRequest>,
) -> ApiResult<Json<CrewResponse>> {
    let crew = state
        .coordinator
        .join(session_id, &operator, request.role)
        .await?;
    Ok(Json(CrewResponse { session_id, crew }))
}

/// POST /sessions/:id/crew/force-join
pub async fn force_join(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Caller(operator): Caller,
    Json(request): Json<RoleRequest>,
) -> ApiResult<Json<CrewResponse>> {
    let crew = state
        .coordinator
        .force_join(session_id, &operator, request.role)
        .await?;
    Ok(Json(CrewResponse { session_id, crew }))
}

/// POST /sessions/:id/crew/leave
pub async fn leave(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Caller(operator): Caller,
) -> ApiResult<Json<CrewResponse>> {
    let crew = state.coordinator.leave(session_id, &operator).await?;
    Ok(Json(CrewResponse { session_id, crew }))
}

pub fn crew_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions/:id/crew/join", post(join))
        .route("/sessions/:id/crew/force-join", post(force_join))
        .route("/sessions/:id/crew/leave", post(leave))
}
