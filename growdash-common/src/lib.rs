//! # Growdash Common Library
//!
//! Shared code for the grow-facility services including:
//! - Harvest data model (sessions, crew memberships, plant records)
//! - Event types (`HarvestEvent` enum) and the `EventBus`
//! - Configuration loading and root folder resolution
//! - SSE stream helpers

pub mod config;
pub mod error;
pub mod events;
pub mod harvest;
pub mod sse;

pub use error::{Error, Result};
