//! Engine and server configuration, loaded from TOML.

use crate::errors::ConfigError;
use crate::pipeline::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentflowConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Retry policy for stages and tasks.
    #[serde(default)]
    pub orchestrator: RetryConfig,
    /// Progress gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Default content stage settings.
    #[serde(default)]
    pub stages: StagesConfig,
}

impl ContentflowConfig {
    /// Parses configuration from a TOML string.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_true() -> bool {
    true
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Allow any CORS origin.
    #[serde(default = "default_true")]
    pub cors_allow_any: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_allow_any: true,
        }
    }
}

fn default_heartbeat_interval_ms() -> u64 {
    15_000
}

fn default_latest_events() -> usize {
    20
}

fn default_channel_capacity() -> usize {
    256
}

/// Progress gateway settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Interval between heartbeats on live streams.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Number of recent events included in a status report.
    #[serde(default = "default_latest_events")]
    pub latest_events: usize,
    /// Per-job broadcast channel capacity.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            latest_events: default_latest_events(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl GatewayConfig {
    /// Heartbeat interval as a duration.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }
}

fn default_sections() -> usize {
    4
}

fn default_section_words() -> usize {
    180
}

fn default_social_channels() -> Vec<String> {
    ["linkedin", "youtube", "facebook", "email", "twitter", "landing"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Settings for the built-in content stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagesConfig {
    /// Sections the planner lays out (1 to 7).
    #[serde(default = "default_sections")]
    pub sections: usize,
    /// Target words per section.
    #[serde(default = "default_section_words")]
    pub section_words: usize,
    /// Channels the social writer produces assets for.
    #[serde(default = "default_social_channels")]
    pub social_channels: Vec<String>,
    /// Text-to-speech command; the script is piped to its stdin.
    #[serde(default)]
    pub tts_command: Option<String>,
    /// Arguments for the TTS command.
    #[serde(default)]
    pub tts_args: Vec<String>,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            sections: default_sections(),
            section_words: default_section_words(),
            social_channels: default_social_channels(),
            tts_command: None,
            tts_args: Vec::new(),
        }
    }
}
