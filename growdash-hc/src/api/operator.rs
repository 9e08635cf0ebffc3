//! Caller identity and device key checks
//!
//! Operator identity is issued by an external identity service and trusted
//! as given: `X-Operator-Id` (UUID, required) and `X-Operator-Name`.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use growdash_common::harvest::Operator;
use uuid::Uuid;

use crate::error::ApiError;

pub const OPERATOR_ID_HEADER: &str = "x-operator-id";
pub const OPERATOR_NAME_HEADER: &str = "x-operator-name";
pub const DEVICE_KEY_HEADER: &str = "x-device-key";

/// Operator making the request
#[derive(Debug, Clone)]
pub struct Caller(pub Operator);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(OPERATOR_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("Missing X-Operator-Id header".to_string()))?
            .to_str()
            .ok()
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .ok_or_else(|| ApiError::Unauthorized("X-Operator-Id must be a UUID".to_string()))?;

        let name = parts
            .headers
            .get(OPERATOR_NAME_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .unwrap_or_default();

        Ok(Caller(Operator::new(id, name)))
    }
}

/// Check `X-Device-Key` when a device key is configured
pub fn check_device_key(expected: Option<&str>, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    match headers.get(DEVICE_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        Some(given) if given == expected => Ok(()),
        Some(_) => Err(ApiError::Unauthorized("Invalid device key".to_string())),
        None => Err(ApiError::Unauthorized("Missing X-Device-Key header".to_string())),
    }
}
