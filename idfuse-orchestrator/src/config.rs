//! Orchestrator settings resolved from the bootstrap configuration

use crate::fusion::FusionConfig;
use idfuse_common::config::TomlConfig;
use idfuse_common::{Error, Result};
use std::time::Duration;

/// Everything the orchestrator needs at construction
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub fusion: FusionConfig,
    /// Default per-call verification timeout
    pub verify_timeout: Duration,
    pub context_timeout: Duration,
    /// Added to the longest verification timeout to form the fan-out deadline
    pub fanout_grace: Duration,
    /// Question-answering backend base URL; no context branch when unset
    pub context_url: Option<String>,
}

impl OrchestratorSettings {
    pub fn from_toml(config: &TomlConfig) -> Result<Self> {
        let fusion = FusionConfig::new(config.fusion.threshold, config.fusion.margin)
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            fusion,
            verify_timeout: secs("timeouts.verify_secs", config.timeouts.verify_secs)?,
            context_timeout: secs("timeouts.context_secs", config.timeouts.context_secs)?,
            fanout_grace: Duration::from_millis(config.timeouts.grace_ms),
            context_url: config
                .context_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string),
        })
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            fusion: FusionConfig::default(),
            verify_timeout: crate::verification::DEFAULT_VERIFY_TIMEOUT,
            context_timeout: crate::context::DEFAULT_CONTEXT_TIMEOUT,
            fanout_grace: crate::fanout::DEFAULT_FANOUT_GRACE,
            context_url: None,
        }
    }
}

fn secs(name: &str, value: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => Err(Error::Config(format!("{} must be positive, got {}", name, value))),
    }
}
