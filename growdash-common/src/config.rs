//! Configuration loading and root folder resolution
//!
//! Bootstrap values are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file is never fatal: a warning is logged
//! and compiled defaults are used.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "GROWDASH_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "growdash.db";

/// Compiled fallback values for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

/// Bootstrap configuration shared by every service TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Default location of a module's TOML file: `<config_dir>/growdash/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("growdash").join(format!("{}.toml", module_name)))
}

/// Read and parse a TOML file, failing on any problem
pub fn read_toml_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid TOML in {}: {}", path.display(), e)))
}

/// Read a TOML file, falling back to defaults when it is missing or invalid
pub fn load_toml_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    if !path.exists() {
        warn!("Config file {} not found, using defaults", path.display());
        return T::default();
    }

    match read_toml_config(path) {
        Ok(config) => {
            info!("Loaded config file {}", path.display());
            config
        }
        Err(e) => {
            warn!("{}; using defaults", e);
            T::default()
        }
    }
}

/// Resolves the root folder following the bootstrap priority order
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_path: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        let module_name = module_name.into();
        let toml_path = default_config_path(&module_name);
        Self {
            module_name,
            cli_arg: None,
            toml_path,
        }
    }

    /// Root folder given on the command line
    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    /// TOML file consulted at priority 3
    pub fn with_toml_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.toml_path = Some(path.into());
        self
    }

    pub fn resolve(&self) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_arg {
            debug!("{}: root folder from command line", self.module_name);
            return path.clone();
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.is_empty() {
                debug!("{}: root folder from {}", self.module_name, ROOT_FOLDER_ENV);
                return PathBuf::from(path);
            }
        }

        // Priority 3: TOML config file
        if let Some(toml_path) = &self.toml_path {
            if toml_path.exists() {
                match read_toml_config::<TomlConfig>(toml_path) {
                    Ok(TomlConfig {
                        root_folder: Some(root),
                        ..
                    }) => {
                        debug!("{}: root folder from {}", self.module_name, toml_path.display());
                        return root;
                    }
                    Ok(_) => {}
                    Err(e) => warn!("{}: {}", self.module_name, e),
                }
            }
        }

        // Priority 4: OS-dependent compiled default
        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and locates the database inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// Create the root folder if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/growdash (or /var/lib/growdash for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("growdash"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/growdash"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("growdash"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/growdash"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("growdash"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\growdash"))
    } else {
        PathBuf::from("./growdash_data")
    }
}
