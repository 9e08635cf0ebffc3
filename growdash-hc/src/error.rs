//! Error types for growdash-hc
//!
//! `HarvestError` is what the coordinator returns; `ApiError` maps it onto
//! HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use growdash_common::harvest::{Operator, OperatorId, RoomId, SessionId};
use serde_json::json;
use thiserror::Error;

/// Coordinator error taxonomy
///
/// Every variant is returned synchronously to the caller. Only `Storage`
/// indicates a fault on our side.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Mutation attempted on a completed session
    #[error("Session {0} is completed")]
    SessionClosed(SessionId),

    #[error("Plant {plant_number} is already recorded in this session")]
    DuplicatePlant { plant_number: u32 },

    #[error("Wet weight must be a positive number of grams, got {grams}")]
    InvalidWeight { grams: i64 },

    #[error("Plant number must be 1 or greater, got {plant_number}")]
    InvalidPlantNumber { plant_number: i64 },

    /// Weighing role is held by someone else; resolve with force-join
    #[error("Role is held by {} ({})", current_holder.name, current_holder.id)]
    RoleConflict { current_holder: Operator },

    #[error("Plant {plant_number} is not recorded in this session")]
    PlantNotFound { plant_number: u32 },

    /// Caller is not the active weighing member
    #[error("Operator {operator} does not hold the weighing role")]
    RoleNotHeld { operator: OperatorId },

    /// Device scan arrived while nobody holds the weighing role
    #[error("Nobody holds the weighing role in session {0}")]
    WeighingVacant(SessionId),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),

    /// Room has no active cycle to harvest
    #[error("Room {0} has no active cycle")]
    RoomInactive(RoomId),

    #[error("Storage error: {0}")]
    Storage(#[from] growdash_common::Error),
}

impl HarvestError {
    /// Stable machine-readable code used in API responses
    pub fn code(&self) -> &'static str {
        match self {
            HarvestError::SessionClosed(_) => "SESSION_CLOSED",
            HarvestError::DuplicatePlant { .. } => "DUPLICATE_PLANT",
            HarvestError::InvalidWeight { .. } => "INVALID_WEIGHT",
            HarvestError::InvalidPlantNumber { .. } => "INVALID_PLANT_NUMBER",
            HarvestError::RoleConflict { .. } => "ROLE_CONFLICT",
            HarvestError::PlantNotFound { .. } => "PLANT_NOT_FOUND",
            HarvestError::RoleNotHeld { .. } => "ROLE_NOT_HELD",
            HarvestError::WeighingVacant(_) => "WEIGHING_VACANT",
            HarvestError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            HarvestError::RoomNotFound(_) => "ROOM_NOT_FOUND",
            HarvestError::RoomInactive(_) => "ROOM_INACTIVE",
            HarvestError::Storage(_) => "STORAGE_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            HarvestError::SessionClosed(_)
            | HarvestError::DuplicatePlant { .. }
            | HarvestError::RoleConflict { .. }
            | HarvestError::WeighingVacant(_) => StatusCode::CONFLICT,
            HarvestError::InvalidWeight { .. }
            | HarvestError::InvalidPlantNumber { .. }
            | HarvestError::RoomInactive(_) => StatusCode::BAD_REQUEST,
            HarvestError::PlantNotFound { .. }
            | HarvestError::SessionNotFound(_)
            | HarvestError::RoomNotFound(_) => StatusCode::NOT_FOUND,
            HarvestError::RoleNotHeld { .. } => StatusCode::FORBIDDEN,
            HarvestError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Coordinator result type
pub type HarvestResult<T> = Result<T, HarvestError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Harvest(#[from] HarvestError),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing or malformed caller identity (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// growdash-common error
    #[error("Common error: {0}")]
    Common(#[from] growdash_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ApiError::Harvest(err) => {
                if let HarvestError::Storage(inner) = err {
                    tracing::error!("Storage failure: {}", inner);
                }
                (err.status(), err.code(), err.to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
            }
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
            ApiError::Common(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let mut error = json!({
            "code": error_code,
            "message": message,
        });

        // Clients need the holder's identity to offer a force-join
        if let ApiError::Harvest(HarvestError::RoleConflict { current_holder }) = &self {
            error["current_holder"] = json!(current_holder);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
