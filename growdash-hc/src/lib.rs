//! growdash-hc - harvest recording coordinator
//!
//! Library interface; the binary in `main.rs` wires it to a TCP listener.

pub mod aggregator;
pub mod api;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod device_bridge;
pub mod error;
pub mod fanout;
pub mod rooms;

pub use crate::error::{ApiError, ApiResult, HarvestError, HarvestResult};

use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use coordinator::Coordinator;
use device_bridge::EdgeBridge;
use fanout::FanoutHub;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub bridge: EdgeBridge,
    pub fanout: FanoutHub,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Required as `X-Device-Key` on device endpoints when set
    pub device_api_key: Option<String>,
}

impl AppState {
    pub fn new(
        coordinator: Arc<Coordinator>,
        bridge: EdgeBridge,
        device_api_key: Option<String>,
    ) -> Self {
        let fanout = coordinator.fanout().clone();
        Self {
            coordinator,
            bridge,
            fanout,
            startup_time: Utc::now(),
            device_api_key,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::session_routes())
        .merge(api::crew_routes())
        .merge(api::plant_routes())
        .merge(api::device_routes())
        .route("/sessions/:id/events", get(api::session_event_stream))
        .route("/events", get(api::lobby_event_stream))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
