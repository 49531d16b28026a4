use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

use crate::ratelimit::{EventClass, RateLimitRule};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // Cloud service identifiers
    #[serde(default = "default_service_name")]
    pub cloud_service_name: String,
    pub cloud_pod: Option<String>,

    /// JWT secret key
    pub cloud_auth_jwt_secret: Option<String>,

    /// Database URL
    pub db_url: Option<String>,

    // Presence sweep
    #[serde(default = "default_presence_offline_threshold_mins")]
    pub presence_offline_threshold_mins: u64,
    #[serde(default = "default_presence_sweep_interval_secs")]
    pub presence_sweep_interval_secs: u64,

    // Collaboration session sweep
    #[serde(default = "default_session_inactivity_mins")]
    pub session_inactivity_mins: u64,
    #[serde(default = "default_session_sweep_interval_secs")]
    pub session_sweep_interval_secs: u64,

    // Rate limits, one budget per event class
    #[serde(default = "default_rate_limit_general_max")]
    pub rate_limit_general_max: u32,
    #[serde(default = "default_rate_limit_general_window_ms")]
    pub rate_limit_general_window_ms: u64,
    #[serde(default = "default_rate_limit_high_frequency_max")]
    pub rate_limit_high_frequency_max: u32,
    #[serde(default = "default_rate_limit_high_frequency_window_ms")]
    pub rate_limit_high_frequency_window_ms: u64,
    #[serde(default = "default_rate_limit_critical_max")]
    pub rate_limit_critical_max: u32,
    #[serde(default = "default_rate_limit_critical_window_ms")]
    pub rate_limit_critical_window_ms: u64,
    #[serde(default = "default_rate_limit_broadcast_max")]
    pub rate_limit_broadcast_max: u32,
    #[serde(default = "default_rate_limit_broadcast_window_ms")]
    pub rate_limit_broadcast_window_ms: u64,
    #[serde(default = "default_rate_limit_purge_interval_secs")]
    pub rate_limit_purge_interval_secs: u64,

    /// Prefix for the shared pub/sub channels
    #[serde(default = "default_pubsub_channel_prefix")]
    pub pubsub_channel_prefix: String,

    /// Messages buffered per pub/sub subscriber before lagging
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        // Load from environment variables using envy
        match envy::from_env::<Config>() {
            Ok(config) => {
                info!("✅ Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    /// Identifier of this process instance on the shared channel.
    pub fn instance_id(&self) -> String {
        match &self.cloud_pod {
            Some(pod) if !pod.trim().is_empty() => pod.clone(),
            _ => format!("{}-{}", self.cloud_service_name, uuid::Uuid::new_v4()),
        }
    }

    pub fn presence_offline_threshold(&self) -> Duration {
        Duration::from_secs(self.presence_offline_threshold_mins * 60)
    }

    pub fn session_inactivity(&self) -> Duration {
        Duration::from_secs(self.session_inactivity_mins * 60)
    }

    /// Rate limit budgets keyed by event class.
    pub fn rate_limit_rules(&self) -> Vec<(EventClass, RateLimitRule)> {
        vec![
            (
                EventClass::General,
                RateLimitRule::new(self.rate_limit_general_max, self.rate_limit_general_window_ms),
            ),
            (
                EventClass::HighFrequency,
                RateLimitRule::new(
                    self.rate_limit_high_frequency_max,
                    self.rate_limit_high_frequency_window_ms,
                ),
            ),
            (
                EventClass::Critical,
                RateLimitRule::new(self.rate_limit_critical_max, self.rate_limit_critical_window_ms),
            ),
            (
                EventClass::Broadcast,
                RateLimitRule::new(self.rate_limit_broadcast_max, self.rate_limit_broadcast_window_ms),
            ),
        ]
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            cloud_service_name: default_service_name(),
            cloud_pod: None,
            cloud_auth_jwt_secret: None,
            db_url: None,
            presence_offline_threshold_mins: default_presence_offline_threshold_mins(),
            presence_sweep_interval_secs: default_presence_sweep_interval_secs(),
            session_inactivity_mins: default_session_inactivity_mins(),
            session_sweep_interval_secs: default_session_sweep_interval_secs(),
            rate_limit_general_max: default_rate_limit_general_max(),
            rate_limit_general_window_ms: default_rate_limit_general_window_ms(),
            rate_limit_high_frequency_max: default_rate_limit_high_frequency_max(),
            rate_limit_high_frequency_window_ms: default_rate_limit_high_frequency_window_ms(),
            rate_limit_critical_max: default_rate_limit_critical_max(),
            rate_limit_critical_window_ms: default_rate_limit_critical_window_ms(),
            rate_limit_broadcast_max: default_rate_limit_broadcast_max(),
            rate_limit_broadcast_window_ms: default_rate_limit_broadcast_window_ms(),
            rate_limit_purge_interval_secs: default_rate_limit_purge_interval_secs(),
            pubsub_channel_prefix: default_pubsub_channel_prefix(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvError(#[from] envy::Error),
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "colabri-realtime".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_presence_offline_threshold_mins() -> u64 {
    5
}

fn default_presence_sweep_interval_secs() -> u64 {
    60
}

fn default_session_inactivity_mins() -> u64 {
    30
}

fn default_session_sweep_interval_secs() -> u64 {
    300
}

fn default_rate_limit_general_max() -> u32 {
    60
}

fn default_rate_limit_general_window_ms() -> u64 {
    60_000
}

fn default_rate_limit_high_frequency_max() -> u32 {
    20
}

fn default_rate_limit_high_frequency_window_ms() -> u64 {
    10_000
}

fn default_rate_limit_critical_max() -> u32 {
    10
}

fn default_rate_limit_critical_window_ms() -> u64 {
    60_000
}

fn default_rate_limit_broadcast_max() -> u32 {
    5
}

fn default_rate_limit_broadcast_window_ms() -> u64 {
    5 * 60_000
}

fn default_rate_limit_purge_interval_secs() -> u64 {
    60
}

fn default_pubsub_channel_prefix() -> String {
    "colabri:realtime:".to_string()
}

fn default_broadcast_capacity() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_budgets() {
        let config = Config::default();
        let rules = config.rate_limit_rules();
        let general = rules.iter().find(|(c, _)| *c == EventClass::General).unwrap();
        assert_eq!(general.1.max_events, 60);
        assert_eq!(general.1.window, Duration::from_millis(60_000));
        let broadcast = rules.iter().find(|(c, _)| *c == EventClass::Broadcast).unwrap();
        assert_eq!(broadcast.1.max_events, 5);
        assert_eq!(broadcast.1.window, Duration::from_secs(300));
        assert_eq!(config.session_inactivity(), Duration::from_secs(30 * 60));
    }

    #[test]
    fn instance_id_prefers_pod_name() {
        let mut config = Config::default();
        config.cloud_pod = Some("pod-7".to_string());
        assert_eq!(config.instance_id(), "pod-7");

        config.cloud_pod = None;
        assert!(config.instance_id().starts_with("colabri-realtime-"));
    }
}
