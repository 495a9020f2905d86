use serde::Deserialize;
use std::path::Path;

use crate::provision::session::{DEFAULT_CAPACITY, DEFAULT_SWEEP_INTERVAL_SECS, DEFAULT_TTL_SECS};
use crate::provision::AuthMismatchPolicy;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub provision: ProvisionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionConfig {
    /// Ceiling on concurrent handshake sessions.
    pub max_sessions: usize,
    /// Session lifetime before the sweeper may remove it.
    pub session_ttl_secs: i64,
    /// Interval of the expiry sweeper.
    pub sweep_interval_secs: u64,
    /// Response to an Auth frame whose verify code does not match.
    pub on_auth_mismatch: AuthMismatchPolicy,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {:?}: {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provision: ProvisionConfig {
                max_sessions: DEFAULT_CAPACITY,
                session_ttl_secs: DEFAULT_TTL_SECS,
                sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
                on_auth_mismatch: AuthMismatchPolicy::default(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}
