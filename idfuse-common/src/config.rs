//! Bootstrap configuration loading
//!
//! Resolution priority for every setting:
//! 1. Command-line argument (handled by the binary)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Built-in default
//!
//! The resolved [`TomlConfig`] is handed to components at construction time.
//! Nothing here is read again after startup.

use crate::models::ServiceDescriptor;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "IDFUSE_CONFIG";

/// Environment override for the fusion threshold
pub const THRESHOLD_ENV_VAR: &str = "IDFUSE_THRESHOLD";

/// Environment override for the fusion margin
pub const MARGIN_ENV_VAR: &str = "IDFUSE_MARGIN";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// SQLite database file for service and access logs
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Base URL of the question-answering backend
    #[serde(default)]
    pub context_url: Option<String>,

    /// Largest accepted image upload
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub fusion: FusionSettings,

    #[serde(default)]
    pub timeouts: TimeoutSettings,

    /// Verification backend registry
    #[serde(default)]
    pub services: Vec<ServiceDescriptor>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Decision rule parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionSettings {
    /// Minimum top score for any positive decision
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Minimum lead of the top score over the runner-up
    #[serde(default = "default_margin")]
    pub margin: f64,
}

/// Network timeouts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeoutSettings {
    /// Per verification call, seconds
    #[serde(default = "default_verify_secs")]
    pub verify_secs: f64,
    /// Context query, seconds
    #[serde(default = "default_context_secs")]
    pub context_secs: f64,
    /// Added to the longest per-call timeout to form the fan-out deadline
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
}

fn default_port() -> u16 {
    8000
}

fn default_max_image_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_threshold() -> f64 {
    0.75
}

fn default_margin() -> f64 {
    0.2
}

fn default_verify_secs() -> f64 {
    5.0
}

fn default_context_secs() -> f64 {
    10.0
}

fn default_grace_ms() -> u64 {
    500
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            margin: default_margin(),
        }
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            verify_secs: default_verify_secs(),
            context_secs: default_context_secs(),
            grace_ms: default_grace_ms(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            database_path: None,
            context_url: None,
            max_image_bytes: default_max_image_bytes(),
            logging: LoggingConfig::default(),
            fusion: FusionSettings::default(),
            timeouts: TimeoutSettings::default(),
            services: Vec::new(),
        }
    }
}

impl TomlConfig {
    /// Parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config: TomlConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
        info!(
            path = %path.display(),
            services = config.services.len(),
            "Loaded TOML config"
        );
        Ok(config)
    }

    /// Load from the resolved path, or fall back to built-in defaults
    ///
    /// An explicitly named file that cannot be read is an error; a missing
    /// default file is not.
    pub fn load_or_default(cli_arg: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_arg, CONFIG_ENV_VAR) {
            Some((path, explicit)) => {
                if explicit || path.exists() {
                    Self::load(&path)
                } else {
                    Ok(Self::default())
                }
            }
            None => {
                info!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Apply `IDFUSE_THRESHOLD` / `IDFUSE_MARGIN` over the TOML values
    pub fn apply_env_overrides(&mut self) {
        if let Some(threshold) = read_env_f64(THRESHOLD_ENV_VAR) {
            info!(threshold, "Fusion threshold overridden from environment");
            self.fusion.threshold = threshold;
        }
        if let Some(margin) = read_env_f64(MARGIN_ENV_VAR) {
            info!(margin, "Fusion margin overridden from environment");
            self.fusion.margin = margin;
        }
    }

    /// Check ranges that the rest of the system relies on
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.fusion.threshold) {
            return Err(Error::Config(format!(
                "fusion.threshold must be within 0.0-1.0, got {}",
                self.fusion.threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.fusion.margin) {
            return Err(Error::Config(format!(
                "fusion.margin must be within 0.0-1.0, got {}",
                self.fusion.margin
            )));
        }
        if !(self.timeouts.verify_secs > 0.0) || !(self.timeouts.context_secs > 0.0) {
            return Err(Error::Config("timeouts must be positive".to_string()));
        }
        if self.max_image_bytes == 0 {
            return Err(Error::Config("max_image_bytes must be positive".to_string()));
        }
        Ok(())
    }

    /// Database path from config, or the OS-dependent default
    pub fn database_path_or_default(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(default_database_path)
    }
}

fn read_env_f64(name: &str) -> Option<f64> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<f64>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring {}={:?}: {}", name, raw, e);
            None
        }
    }
}

/// Resolve the config file path
///
/// Returns the path and whether it was named explicitly (CLI or environment).
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<(PathBuf, bool)> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some((path.to_path_buf(), true));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some((PathBuf::from(path), true));
        }
    }

    // Priority 3: OS-dependent default location
    default_config_path().map(|path| (path, false))
}

/// `~/.config/idfuse/idfuse.toml` or the platform equivalent
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("idfuse").join("idfuse.toml"))
}

/// `~/.local/share/idfuse/idfuse.db` or the platform equivalent
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("idfuse"))
        .unwrap_or_else(|| PathBuf::from("./idfuse_data"))
        .join("idfuse.db")
}
