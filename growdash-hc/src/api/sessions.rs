//! Session lifecycle handlers
//!
//! POST /sessions, GET /sessions, GET /sessions/:id, POST /sessions/:id/complete,
//! GET /sessions/:id/summary, GET /rooms/:room_id/session

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use growdash_common::harvest::{
    CompletionInputs, CrewSummary, RoomId, SessionId, SessionRecord, SessionStatus, SessionView,
};
use serde::Deserialize;

use crate::db::sessions::SessionFilter;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Upper bound on `limit` for session listings
const MAX_LIST_LIMIT: u32 = 200;

/// POST /sessions request
#[derive(Debug, Deserialize)]
pub struct OpenSessionRequest {
    pub room_id: RoomId,
}

/// GET /sessions query
#[derive(Debug, Default, Deserialize)]
pub struct ListSessionsQuery {
    pub room_id: Option<RoomId>,
    pub status: Option<String>,
    pub limit: Option<u32>,
}

impl ListSessionsQuery {
    fn into_filter(self) -> ApiResult<SessionFilter> {
        let status = match self.status.as_deref() {
            None | Some("") => None,
            Some(s) => Some(
                SessionStatus::parse(s)
                    .ok_or_else(|| ApiError::BadRequest(format!("Unknown session status: {}", s)))?,
            ),
        };
        let defaults = SessionFilter::default();
        Ok(SessionFilter {
            room_id: self.room_id,
            status,
            limit: self.limit.unwrap_or(defaults.limit).clamp(1, MAX_LIST_LIMIT),
        })
    }
}

/// POST /sessions
///
/// 201 with the new session, or 200 with the room's in-progress session.
pub async fn open_session(
    State(state): State<AppState>,
    Json(request): Json<OpenSessionRequest>,
) -> ApiResult<(StatusCode, Json<SessionView>)> {
    let opened = state.coordinator.open(request.room_id).await?;
    let status = if opened.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(opened.view)))
}

/// GET /sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<ListSessionsQuery>,
) -> ApiResult<Json<Vec<SessionRecord>>> {
    let filter = query.into_filter()?;
    Ok(Json(state.coordinator.list_sessions(&filter).await?))
}

/// GET /sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<Json<SessionView>> {
    Ok(Json(state.coordinator.snapshot(session_id).await?))
}

/// GET /rooms/:room_id/session
///
/// The room's in-progress session, or `null`.
pub async fn get_room_session(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
) -> ApiResult<Json<Option<SessionView>>> {
    Ok(Json(state.coordinator.active_for_room(room_id).await?))
}

/// POST /sessions/:id/complete
///
/// The body is optional; when present it must parse as completion inputs.
pub async fn complete_session(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    body: Bytes,
) -> ApiResult<Json<SessionView>> {
    let inputs = parse_completion_inputs(&body)?;
    Ok(Json(state.coordinator.complete(session_id, inputs).await?))
}

fn parse_completion_inputs(body: &[u8]) -> ApiResult<CompletionInputs> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(CompletionInputs::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid completion inputs: {}", e)))
}

/// GET /sessions/:id/summary
pub async fn get_summary(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<Json<CrewSummary>> {
    state
        .coordinator
        .summary(session_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Session {} has no summary yet", session_id)))
}

/// Build session routes
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(open_session).get(list_sessions))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/complete", post(complete_session))
        .route("/sessions/:id/summary", get(get_summary))
        .route("/rooms/:room_id/session", get(get_room_session))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_defaults_and_clamp() {
        let filter = ListSessionsQuery::default().into_filter().unwrap();
        assert_eq!(filter.limit, 20);
        assert!(filter.status.is_none());

        let filter = ListSessionsQuery {
            limit: Some(10_000),
            status: Some("completed".to_string()),
            ..Default::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.limit, MAX_LIST_LIMIT);
        assert_eq!(filter.status, Some(SessionStatus::Completed));
    }

    #[test]
    fn test_list_query_rejects_unknown_status() {
        let query = ListSessionsQuery {
            status: Some("paused".to_string()),
            ..Default::default()
        };
        assert!(matches!(query.into_filter(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_completion_inputs_empty_body_defaults() {
        assert_eq!(parse_completion_inputs(b"").unwrap(), CompletionInputs::default());
        assert_eq!(parse_completion_inputs(b" \n").unwrap(), CompletionInputs::default());

        let inputs = parse_completion_inputs(br#"{"pots_per_trip": 4}"#).unwrap();
        assert_eq!(inputs.pots_per_trip, Some(4));
    }

    #[test]
    fn test_completion_inputs_reject_malformed_body() {
        let bodies: [&[u8]; 3] = [
            br#"{"pots_per_trip": 4"#,
            br#"{"pots_per_trip": "four"}"#,
            br#"{"pots_per_trp": 4}"#,
        ];
        for body in bodies {
            assert!(matches!(
                parse_completion_inputs(body),
                Err(ApiError::BadRequest(_))
            ));
        }
    }
}
