//! Plant ledger handlers
//!
//! POST /sessions/:id/plants, DELETE and PATCH /sessions/:id/plants/:n.
//! Only the active weighing member may write.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{patch, post},
    Json, Router,
};
use growdash_common::harvest::{SessionId, SessionView};
use serde::Deserialize;

use super::operator::Caller;
use crate::error::ApiResult;
use crate::AppState;

/// POST /sessions/:id/plants request
///
/// Signed integers so out-of-range input reaches validation and gets a
/// proper error code instead of a deserialization failure.
#[derive(Debug, Deserialize)]
pub struct RecordPlantRequest {
    pub plant_number: i64,
    pub wet_weight_grams: i64,
}

/// PATCH /sessions/:id/plants/:n request
#[derive(Debug, Deserialize)]
pub struct AnnotateRequest {
    #[serde(default)]
    pub error_note: Option<String>,
}

/// POST /sessions/:id/plants
pub async fn record_plant(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Caller(operator): Caller,
    Json(request): Json<RecordPlantRequest>,
) -> ApiResult<(StatusCode, Json<SessionView>)> {
    let view = state
        .coordinator
        .record(
            session_id,
            &operator,
            request.plant_number,
            request.wet_weight_grams,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// DELETE /sessions/:id/plants/:n
pub async fn remove_plant(
    State(state): State<AppState>,
    Path((session_id, plant_number)): Path<(SessionId, u32)>,
    Caller(operator): Caller,
) -> ApiResult<Json<SessionView>> {
    let view = state
        .coordinator
        .remove(session_id, &operator, plant_number)
        .await?;
    Ok(Json(view))
}

/// PATCH /sessions/:id/plants/:n
pub async fn annotate_plant(
    State(state): State<AppState>,
    Path((session_id, plant_number)): Path<(SessionId, u32)>,
    Caller(operator): Caller,
    Json(request): Json<AnnotateRequest>,
) -> ApiResult<Json<SessionView>> {
    let view = state
        .coordinator
        .annotate(session_id, &operator, plant_number, request.error_note)
        .await?;
    Ok(Json(view))
}

pub fn plant_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions/:id/plants", post(record_plant))
        .route(
            "/sessions/:id/plants/:n",
            patch(annotate_plant).delete(remove_plant),
        )
}
