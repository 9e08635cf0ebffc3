//! Configuration resolution for growdash-hc
//!
//! Settings follow the bootstrap priority: command line / environment
//! (both handled by clap) → TOML `[coordinator]` section → compiled default.

use growdash_common::config::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Module name used for the default TOML location
pub const MODULE_NAME: &str = "growdash-hc";

pub const DEFAULT_PORT: u16 = 5780;
pub const DEFAULT_GRACE_SECS: u64 = 5;
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Contents of `growdash-hc.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HcToml {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub coordinator: CoordinatorSection,
}

/// `[coordinator]` table; every key is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinatorSection {
    pub port: Option<u16>,
    pub bind_host: Option<IpAddr>,
    /// Seconds a device may stay disconnected before clients are alerted
    pub device_grace_secs: Option<u64>,
    /// Per-channel broadcast buffer
    pub event_capacity: Option<usize>,
    /// Shared secret the edge device presents as `X-Device-Key`
    pub device_api_key: Option<String>,
}

/// Values given on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub bind_host: Option<IpAddr>,
    pub device_grace_secs: Option<u64>,
    pub device_api_key: Option<String>,
}

/// Fully resolved runtime settings
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub bind_addr: SocketAddr,
    pub device_grace: Duration,
    pub event_capacity: usize,
    pub device_api_key: Option<String>,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            device_grace: Duration::from_secs(DEFAULT_GRACE_SECS),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            device_api_key: None,
        }
    }
}

impl CoordinatorSettings {
    pub fn resolve(cli: &CliOverrides, toml: &HcToml) -> Self {
        let section = &toml.coordinator;
        let defaults = Self::default();

        let port = cli.port.or(section.port).unwrap_or(DEFAULT_PORT);
        let host = cli
            .bind_host
            .or(section.bind_host)
            .unwrap_or(defaults.bind_addr.ip());

        let grace_secs = cli
            .device_grace_secs
            .or(section.device_grace_secs)
            .unwrap_or(DEFAULT_GRACE_SECS);

        let event_capacity = match section.event_capacity {
            Some(0) => {
                warn!("event_capacity must be positive, using {}", DEFAULT_EVENT_CAPACITY);
                DEFAULT_EVENT_CAPACITY
            }
            Some(n) => n,
            None => DEFAULT_EVENT_CAPACITY,
        };

        let device_api_key = cli
            .device_api_key
            .clone()
            .or_else(|| section.device_api_key.clone())
            .filter(|k| !k.trim().is_empty());

        if device_api_key.is_some() {
            info!("Edge device endpoints require X-Device-Key");
        } else {
            warn!("No device_api_key configured; edge device endpoints are open");
        }

        Self {
            bind_addr: SocketAddr::new(host, port),
            device_grace: Duration::from_secs(grace_secs),
            event_capacity,
            device_api_key,
        }
    }
}
