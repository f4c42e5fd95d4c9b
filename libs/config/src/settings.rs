//! Settings Loading Module
//!
//! Provides configuration loading for the DataLink link and console.
//! Supports loading from TOML files with environment-specific overrides
//! and `DATALINK_` environment variables.

use crate::defaults;
use anyhow::{Context, Result};
use config_rs::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default location of the base configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/datalink.toml";

/// Top-level configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct DataLinkConfig {
    /// Messaging link settings
    pub link: LinkSettings,

    /// Console front end settings
    pub console: ConsoleSettings,
}

/// Settings applied to every `connect_socket` call made from configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LinkSettings {
    /// Remote endpoint, `<host>:<port>` or `[<ipv6>]:<port>`
    pub endpoint: String,

    // Retry policy
    pub retry_interval_ms: u64,
    pub max_retry_attempts: u32,

    // Socket tuning
    pub send_buffer_size: usize,
    pub receive_buffer_size: usize,
    pub connect_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub poll_interval_ms: u64,

    // Worker
    pub idle_wait_ms: u64,
    /// Outbound queue bound; `None` leaves the queue unbounded
    pub queue_capacity: Option<usize>,

    // Wire format
    /// `raw` or `length_prefixed`
    pub framing: String,
    pub max_frame_size: u32,
}

/// Console front end settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ConsoleSettings {
    pub log_level: String,
    pub prompt: String,
    /// Connect to `link.endpoint` as soon as the console starts
    pub auto_connect: bool,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            endpoint: defaults::link::DEFAULT_ENDPOINT.to_string(),
            retry_interval_ms: defaults::link::RETRY_INTERVAL_MS,
            max_retry_attempts: defaults::link::MAX_RETRY_ATTEMPTS,
            send_buffer_size: defaults::link::SEND_BUFFER_SIZE,
            receive_buffer_size: defaults::link::RECEIVE_BUFFER_SIZE,
            connect_timeout_ms: defaults::link::CONNECT_TIMEOUT_MS,
            write_timeout_ms: defaults::link::WRITE_TIMEOUT_MS,
            poll_interval_ms: defaults::link::POLL_INTERVAL_MS,
            idle_wait_ms: defaults::link::IDLE_WAIT_MS,
            queue_capacity: None,
            framing: defaults::link::FRAMING.to_string(),
            max_frame_size: defaults::link::MAX_FRAME_SIZE,
        }
    }
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            log_level: defaults::console::LOG_LEVEL.to_string(),
            prompt: defaults::console::PROMPT.to_string(),
            auto_connect: false,
        }
    }
}

impl DataLinkConfig {
    /// Load configuration from files with environment overrides
    ///
    /// An explicit `base_path` must exist. Without one, `config/datalink.toml`
    /// is used when present and built-in defaults otherwise. Environment
    /// overrides are read from `environments/<name>.toml` next to the base file.
    pub fn load(base_path: Option<&Path>, environment: Option<&str>) -> Result<Self> {
        let required = base_path.is_some();
        let base = base_path.unwrap_or(Path::new(DEFAULT_CONFIG_PATH));

        let mut builder = Config::builder().add_source(File::from(base).required(required));

        if let Some(env) = environment {
            let env_file = base
                .parent()
                .unwrap_or(Path::new("."))
                .join("environments")
                .join(format!("{}.toml", env));

            if env_file.exists() {
                info!("Loading environment config: {:?}", env_file);
                builder = builder.add_source(File::from(env_file));
            } else {
                warn!("Environment config not found: {:?}", env_file);
            }
        }

        // Override with environment variables, e.g. DATALINK_LINK__ENDPOINT
        builder = builder.add_source(
            Environment::with_prefix("DATALINK")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let loaded: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        debug!(endpoint = %loaded.link.endpoint, "Configuration loaded");
        Ok(loaded)
    }

    /// Expand `~` and `$VAR` references in string values
    pub fn expand_env_vars(&mut self) -> Result<()> {
        let expanded = shellexpand::full(&self.link.endpoint)
            .context("Failed to expand link endpoint")?;
        self.link.endpoint = expanded.to_string();
        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Location the base file would be read from
    pub fn default_path() -> PathBuf {
        PathBuf::from(DEFAULT_CONFIG_PATH)
    }
}

/// Convenience function to load configuration with defaults
pub fn load_config(base_path: Option<&Path>) -> Result<DataLinkConfig> {
    let mut config = DataLinkConfig::load(base_path, None)?;
    config.expand_env_vars()?;
    Ok(config)
}
