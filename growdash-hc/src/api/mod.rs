//! HTTP API handlers for growdash-hc
//!
//! REST for session, crew and ledger operations; SSE for observers; a
//! WebSocket link for the weighing edge device.

pub mod crew;
pub mod device;
pub mod health;
pub mod operator;
pub mod plants;
pub mod sessions;
pub mod sse;

pub use crew::crew_routes;
pub use device::device_routes;
pub use health::health_routes;
pub use plants::plant_routes;
pub use sessions::session_routes;
pub use sse::{lobby_event_stream, session_event_stream};
