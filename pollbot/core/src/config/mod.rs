//! TOML Configuration File Support
//!
//! Centralized configuration loading for pollbot, from a TOML file at
//! `~/.config/pollbot/pollbot.toml`.
//!
//! # Configuration Priority
//!
//! Values are applied with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables (`POLLBOT_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! - `$XDG_CONFIG_HOME/pollbot/pollbot.toml` (typically
//!   `~/.config/pollbot/pollbot.toml`)
//!
//! # Example Configuration
//!
//! ```toml
//! [discord]
//! token = "Bot token here"
//! application_id = 123456789012345678
//! request_timeout_secs = 10
//!
//! [polls]
//! announcement_channel = 234567890123456789
//! command_prefix = "!"
//!
//! [store]
//! path = "/var/lib/pollbot/polls.json"
//!
//! [chart]
//! width = 640
//! height = 480
//!
//! [daemon]
//! socket_path = "/run/user/1000/pollbot/pollbot.sock"
//! max_connections = 16
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chart::{DEFAULT_CHART_HEIGHT, DEFAULT_CHART_WIDTH};
use crate::commands::DEFAULT_PREFIX;
use crate::platform::DEFAULT_API_BASE;
use crate::poll::ChannelId;
use crate::transport::default_socket_path;

/// Default Discord request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default limit on concurrent daemon connections
pub const DEFAULT_MAX_CONNECTIONS: usize = 16;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[discord]` section
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordToml {
    /// Bot token
    pub token: Option<String>,

    /// REST API base URL
    pub api_base: Option<String>,

    /// Application id, for slash command registration
    pub application_id: Option<u64>,

    /// Per-request timeout in seconds
    pub request_timeout_secs: Option<u64>,
}

impl fmt::Debug for DiscordToml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordToml")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("application_id", &self.application_id)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// `[polls]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PollsToml {
    /// Channel that gets a notice for every new poll
    pub announcement_channel: Option<u64>,

    /// Text command prefix
    pub command_prefix: Option<String>,
}

/// `[store]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreToml {
    /// JSON file to keep polls in; in-memory when unset
    pub path: Option<String>,
}

/// `[chart]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartToml {
    /// Chart width in pixels
    pub width: Option<u32>,

    /// Chart height in pixels
    pub height: Option<u32>,
}

/// `[daemon]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonToml {
    /// Unix socket path
    pub socket_path: Option<String>,

    /// Maximum simultaneous connections
    pub max_connections: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PollbotToml {
    /// Discord section
    pub discord: DiscordToml,

    /// Polls section
    pub polls: PollsToml,

    /// Store section
    pub store: StoreToml,

    /// Chart section
    pub chart: ChartToml,

    /// Daemon section
    pub daemon: DaemonToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved pollbot configuration
///
/// Use [`load_config`] to load with proper priority handling.
#[derive(Clone)]
pub struct PollbotConfig {
    /// Discord bot token; never logged
    pub discord_token: Option<String>,

    /// Discord REST API base URL
    pub api_base: String,

    /// Application id for slash command registration
    pub application_id: Option<u64>,

    /// Per-request timeout for Discord calls
    pub request_timeout: Duration,

    /// Channel that gets a notice for every new poll
    pub announcement_channel: Option<ChannelId>,

    /// Text command prefix
    pub command_prefix: String,

    /// JSON poll store file; in-memory when `None`
    pub store_path: Option<PathBuf>,

    /// Chart width in pixels
    pub chart_width: u32,

    /// Chart height in pixels
    pub chart_height: u32,

    /// Daemon socket path
    pub socket_path: PathBuf,

    /// Maximum simultaneous daemon connections
    pub max_connections: usize,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for PollbotConfig {
    fn default() -> Self {
        Self {
            discord_token: None,
            api_base: DEFAULT_API_BASE.to_string(),
            application_id: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            announcement_channel: None,
            command_prefix: DEFAULT_PREFIX.to_string(),
            store_path: None,
            chart_width: DEFAULT_CHART_WIDTH,
            chart_height: DEFAULT_CHART_HEIGHT,
            socket_path: default_socket_path(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl fmt::Debug for PollbotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollbotConfig")
            .field(
                "discord_token",
                &self.discord_token.as_ref().map(|_| "<redacted>"),
            )
            .field("api_base", &self.api_base)
            .field("application_id", &self.application_id)
            .field("request_timeout", &self.request_timeout)
            .field("announcement_channel", &self.announcement_channel)
            .field("command_prefix", &self.command_prefix)
            .field("store_path", &self.store_path)
            .field("chart_width", &self.chart_width)
            .field("chart_height", &self.chart_height)
            .field("socket_path", &self.socket_path)
            .field("max_connections", &self.max_connections)
            .field("config_file_path", &self.config_file_path)
            .field("source", &self.source)
            .finish()
    }
}

impl PollbotConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check values that would only fail later at runtime
    ///
    /// # Errors
    ///
    /// [`ConfigError::ValidationError`] naming the offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command_prefix.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "polls.command_prefix must not be empty".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "discord.request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.chart_width == 0 || self.chart_height == 0 {
            return Err(ConfigError::ValidationError(
                "chart.width and chart.height must be greater than 0".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "daemon.max_connections must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/pollbot/pollbot.toml` or
/// `~/.config/pollbot/pollbot.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("pollbot").join("pollbot.toml"))
}

/// Load configuration from all sources with proper priority
///
/// CLI overrides are not handled here; apply [`ConfigOverrides`] after.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<PollbotConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. If `None`, only
///   defaults and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<PollbotConfig, ConfigError> {
    let mut config = PollbotConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: PollbotToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut PollbotConfig, toml: &PollbotToml) {
    // Discord settings
    if toml.discord.token.is_some() {
        config.discord_token.clone_from(&toml.discord.token);
    }
    if let Some(ref base) = toml.discord.api_base {
        config.api_base.clone_from(base);
    }
    if toml.discord.application_id.is_some() {
        config.application_id = toml.discord.application_id;
    }
    if let Some(secs) = toml.discord.request_timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }

    // Poll settings
    if let Some(channel) = toml.polls.announcement_channel {
        config.announcement_channel = Some(ChannelId(channel));
    }
    if let Some(ref prefix) = toml.polls.command_prefix {
        config.command_prefix.clone_from(prefix);
    }

    // Store settings
    if let Some(ref path) = toml.store.path {
        config.store_path = Some(PathBuf::from(path));
    }

    // Chart settings
    if let Some(width) = toml.chart.width {
        config.chart_width = width;
    }
    if let Some(height) = toml.chart.height {
        config.chart_height = height;
    }

    // Daemon settings
    if let Some(ref path) = toml.daemon.socket_path {
        config.socket_path = PathBuf::from(path);
    }
    if let Some(max) = toml.daemon.max_connections {
        config.max_connections = max;
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    let parsed = value.trim().parse().ok();
    if parsed.is_none() {
        tracing::warn!(var = key, "Ignoring unparseable environment variable");
    }
    parsed
}

/// Apply environment variable overrides to the config
///
/// `lookup` returns the value of a variable, if set.
fn apply_env_config<F>(config: &mut PollbotConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    // Discord settings from environment
    if let Some(token) = lookup("POLLBOT_DISCORD_TOKEN") {
        config.discord_token = Some(token);
        config.source = ConfigSource::Env;
    }
    if let Some(base) = lookup("POLLBOT_API_BASE") {
        config.api_base = base;
        config.source = ConfigSource::Env;
    }
    if let Some(id) = lookup("POLLBOT_APPLICATION_ID")
        .and_then(|v| parse_env::<u64>("POLLBOT_APPLICATION_ID", &v))
    {
        config.application_id = Some(id);
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = lookup("POLLBOT_REQUEST_TIMEOUT")
        .and_then(|v| parse_env::<u64>("POLLBOT_REQUEST_TIMEOUT", &v))
    {
        config.request_timeout = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }

    // Poll settings from environment
    if let Some(channel) = lookup("POLLBOT_ANNOUNCE_CHANNEL")
        .and_then(|v| parse_env::<ChannelId>("POLLBOT_ANNOUNCE_CHANNEL", &v))
    {
        config.announcement_channel = Some(channel);
        config.source = ConfigSource::Env;
    }
    if let Some(prefix) = lookup("POLLBOT_COMMAND_PREFIX") {
        config.command_prefix = prefix;
        config.source = ConfigSource::Env;
    }

    // Store settings from environment
    if let Some(path) = lookup("POLLBOT_STORE_PATH") {
        config.store_path = Some(PathBuf::from(path));
        config.source = ConfigSource::Env;
    }

    // Chart settings from environment
    if let Some(width) = lookup("POLLBOT_CHART_WIDTH")
        .and_then(|v| parse_env::<u32>("POLLBOT_CHART_WIDTH", &v))
    {
        config.chart_width = width;
        config.source = ConfigSource::Env;
    }
    if let Some(height) = lookup("POLLBOT_CHART_HEIGHT")
        .and_then(|v| parse_env::<u32>("POLLBOT_CHART_HEIGHT", &v))
    {
        config.chart_height = height;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Socket path override
    pub socket_path: Option<PathBuf>,

    /// Store file override
    pub store_path: Option<PathBuf>,

    /// Announcement channel override
    pub announcement_channel: Option<ChannelId>,

    /// Max connections override
    pub max_connections: Option<usize>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set socket path override
    #[must_use]
    pub fn with_socket_path(mut self, path: PathBuf) -> Self {
        self.socket_path = Some(path);
        self
    }

    /// Set store file override
    #[must_use]
    pub fn with_store_path(mut self, path: PathBuf) -> Self {
        self.store_path = Some(path);
        self
    }

    /// Set announcement channel override
    #[must_use]
    pub fn with_announcement_channel(mut self, channel: ChannelId) -> Self {
        self.announcement_channel = Some(channel);
        self
    }

    /// Set max connections override
    #[must_use]
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Whether any override is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.socket_path.is_none()
            && self.store_path.is_none()
            && self.announcement_channel.is_none()
            && self.max_connections.is_none()
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut PollbotConfig) {
        if !self.is_empty() {
            config.source = ConfigSource::Cli;
        }
        if let Some(ref path) = self.socket_path {
            config.socket_path.clone_from(path);
        }
        if let Some(ref path) = self.store_path {
            config.store_path = Some(path.clone());
        }
        if self.announcement_channel.is_some() {
            config.announcement_channel = self.announcement_channel;
        }
        if let Some(max) = self.max_connections {
            config.max_connections = max;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
