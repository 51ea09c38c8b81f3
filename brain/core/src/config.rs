//! TOML Configuration File Support
//!
//! Centralized configuration loading for the brain, from an optional TOML file
//! at `$XDG_CONFIG_HOME/bmo/brain.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (applied by the caller through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0:8765"
//! max_connections = 32
//!
//! [producer]
//! kind = "ollama"
//! model = "llama3.2"
//! host = "localhost"
//! port = 11434
//!
//! [emotion]
//! decision_timeout_ms = 1200
//! hold_window_ms = 1500
//!
//! [streaming]
//! boundaries = ".,;:!?\n"
//!
//! [turn]
//! queue_capacity = 8
//!
//! [contract]
//! path = "face/src/contracts/faceContract.json"
//! ```
//!
//! `OPENAI_API_KEY` is only ever read from the environment.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::emotion::EmotionSettings;
use crate::splitter::DEFAULT_BOUNDARIES;
use crate::turn::TurnSettings;

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

/// Server section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Address the WebSocket server listens on
    pub bind_address: Option<String>,
    /// Maximum simultaneous face connections
    pub max_connections: Option<usize>,
    /// Outbound queue depth per connection
    pub connection_channel_capacity: Option<usize>,
    /// Per-connection send deadline in milliseconds
    pub send_timeout_ms: Option<u64>,
}

/// Producer section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerToml {
    /// "openai", "ollama" or "none"
    pub kind: Option<String>,
    /// Model name
    pub model: Option<String>,
    /// Base URL for OpenAI-compatible APIs
    pub base_url: Option<String>,
    /// Ollama host
    pub host: Option<String>,
    /// Ollama port
    pub port: Option<u16>,
    /// System prompt sent with every turn
    pub system_prompt: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Whole-request timeout in seconds
    pub request_timeout_secs: Option<u64>,
    /// Longest wait for the next fragment in milliseconds
    pub fragment_timeout_ms: Option<u64>,
}

/// Emotion section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionToml {
    /// Decision deadline after turn start
    pub decision_timeout_ms: Option<u64>,
    /// Hysteresis hold window
    pub hold_window_ms: Option<u64>,
    /// Characters needed to decide a weak tone early
    pub min_signal_chars: Option<usize>,
    /// Duration attached to the neutral fallback
    pub fallback_duration_ms: Option<u32>,
}

/// Streaming section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingToml {
    /// Characters that end a chunk
    pub boundaries: Option<String>,
}

/// Turn section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnToml {
    /// Inputs that may wait behind the active turn
    pub queue_capacity: Option<usize>,
    /// Longest accepted input in characters
    pub max_input_chars: Option<usize>,
}

/// Contract section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractToml {
    /// Path to the face contract JSON
    pub path: Option<PathBuf>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainToml {
    /// Server configuration section
    pub server: ServerToml,
    /// Producer configuration section
    pub producer: ProducerToml,
    /// Emotion configuration section
    pub emotion: EmotionToml,
    /// Streaming configuration section
    pub streaming: StreamingToml,
    /// Turn configuration section
    pub turn: TurnToml,
    /// Contract configuration section
    pub contract: ContractToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Which text producer backs the brain
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProducerKind {
    /// OpenAI-compatible chat completions
    OpenAi,
    /// Local Ollama server
    Ollama,
    /// No producer; the brain echoes the input
    None,
}

impl FromStr for ProducerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            "none" | "echo" => Ok(Self::None),
            other => Err(ConfigError::ValidationError(format!(
                "unknown producer kind `{other}` (expected openai, ollama or none)"
            ))),
        }
    }
}

impl fmt::Display for ProducerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Ollama => write!(f, "ollama"),
            Self::None => write!(f, "none"),
        }
    }
}

/// WebSocket server settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen address
    pub bind_address: String,
    /// Maximum simultaneous face connections
    pub max_connections: usize,
    /// Outbound queue depth per connection
    pub connection_channel_capacity: usize,
    /// Per-connection send deadline
    pub send_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8765".to_string(),
            max_connections: 32,
            connection_channel_capacity: 256,
            send_timeout: Duration::from_millis(2000),
        }
    }
}

/// Text producer settings
#[derive(Clone, Debug, PartialEq)]
pub struct ProducerConfig {
    /// Backend kind
    pub kind: ProducerKind,
    /// Model name; `None` picks the backend's default
    pub model: Option<String>,
    /// Base URL for OpenAI-compatible APIs
    pub base_url: String,
    /// API key (environment only)
    pub api_key: Option<String>,
    /// Ollama host
    pub host: String,
    /// Ollama port
    pub port: u16,
    /// System prompt
    pub system_prompt: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Whole-request timeout
    pub request_timeout: Duration,
    /// Longest wait for the next fragment
    pub fragment_timeout: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            kind: ProducerKind::OpenAi,
            model: None,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            host: "localhost".to_string(),
            port: 11434,
            system_prompt: Some(
                "You are BMO, a small cheerful game console. Reply briefly and warmly.".to_string(),
            ),
            temperature: None,
            request_timeout: Duration::from_secs(60),
            fragment_timeout: Duration::from_millis(15000),
        }
    }
}

impl ProducerConfig {
    /// Model to request, falling back to the backend's default
    #[must_use]
    pub fn effective_model(&self) -> String {
        self.model.clone().unwrap_or_else(|| {
            match self.kind {
                ProducerKind::Ollama => "llama3.2",
                ProducerKind::OpenAi | ProducerKind::None => "gpt-4o-mini",
            }
            .to_string()
        })
    }
}

/// Centralized configuration for the brain
#[derive(Clone, Debug)]
pub struct BrainConfig {
    /// Server settings
    pub server: ServerConfig,
    /// Producer settings
    pub producer: ProducerConfig,
    /// Emotion engine timing
    pub emotion: EmotionSettings,
    /// Chunk boundary characters
    pub boundaries: String,
    /// Inputs that may wait behind the active turn
    pub queue_capacity: usize,
    /// Longest accepted input in characters
    pub max_input_chars: usize,
    /// Face contract file; `None` uses the built-in contract
    pub contract_path: Option<PathBuf>,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    /// Source of configuration values
    source: ConfigSource,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            producer: ProducerConfig::default(),
            emotion: EmotionSettings::default(),
            boundaries: DEFAULT_BOUNDARIES.to_string(),
            queue_capacity: 8,
            max_input_chars: 4000,
            contract_path: None,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl BrainConfig {
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

    /// Reject values the brain cannot run with
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("server.max_connections", self.server.max_connections),
            (
                "server.connection_channel_capacity",
                self.server.connection_channel_capacity,
            ),
            ("turn.queue_capacity", self.queue_capacity),
            ("turn.max_input_chars", self.max_input_chars),
        ];
        for (name, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!("{name} must be > 0")));
            }
        }
        if self.server.send_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "server.send_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.producer.fragment_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "producer.fragment_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.boundaries.is_empty() {
            return Err(ConfigError::ValidationError(
                "streaming.boundaries must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings handed to the turn driver
    #[must_use]
    pub fn turn_settings(&self) -> TurnSettings {
        TurnSettings {
            emotion: self.emotion,
            boundaries: self.boundaries.chars().collect(),
            fragment_timeout: self.producer.fragment_timeout,
            model: self.producer.effective_model(),
            system_prompt: self.producer.system_prompt.clone(),
            temperature: self.producer.temperature,
        }
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/bmo/brain.toml` or `~/.config/bmo/brain.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("bmo").join("brain.toml"))
}

/// Load configuration from the default path and the process environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed.
pub fn load_config() -> Result<BrainConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<BrainConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration reading environment values through `env`
///
/// # Errors
///
/// Returns an error if the config file cannot be read or parsed, or if a
/// value names an unknown producer kind.
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<BrainConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = BrainConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: BrainToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config)?;
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(path = %config_path.display(), "Loaded configuration from file");
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env)?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut BrainConfig, toml: &BrainToml) -> Result<(), ConfigError> {
    // Server
    if let Some(ref addr) = toml.server.bind_address {
        config.server.bind_address.clone_from(addr);
    }
    if let Some(max) = toml.server.max_connections {
        config.server.max_connections = max;
    }
    if let Some(capacity) = toml.server.connection_channel_capacity {
        config.server.connection_channel_capacity = capacity;
    }
    if let Some(ms) = toml.server.send_timeout_ms {
        config.server.send_timeout = Duration::from_millis(ms);
    }

    // Producer
    if let Some(ref kind) = toml.producer.kind {
        config.producer.kind = kind.parse()?;
    }
    if toml.producer.model.is_some() {
        config.producer.model.clone_from(&toml.producer.model);
    }
    if let Some(ref url) = toml.producer.base_url {
        config.producer.base_url.clone_from(url);
    }
    if let Some(ref host) = toml.producer.host {
        config.producer.host.clone_from(host);
    }
    if let Some(port) = toml.producer.port {
        config.producer.port = port;
    }
    if toml.producer.system_prompt.is_some() {
        config
            .producer
            .system_prompt
            .clone_from(&toml.producer.system_prompt);
    }
    if toml.producer.temperature.is_some() {
        config.producer.temperature = toml.producer.temperature;
    }
    if let Some(secs) = toml.producer.request_timeout_secs {
        config.producer.request_timeout = Duration::from_secs(secs);
    }
    if let Some(ms) = toml.producer.fragment_timeout_ms {
        config.producer.fragment_timeout = Duration::from_millis(ms);
    }

    // Emotion
    if let Some(ms) = toml.emotion.decision_timeout_ms {
        config.emotion.decision_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.emotion.hold_window_ms {
        config.emotion.hold_window = Duration::from_millis(ms);
    }
    if let Some(chars) = toml.emotion.min_signal_chars {
        config.emotion.min_signal_chars = chars;
    }
    if let Some(ms) = toml.emotion.fallback_duration_ms {
        config.emotion.fallback_duration_ms = ms;
    }

    // Streaming
    if let Some(ref boundaries) = toml.streaming.boundaries {
        config.boundaries.clone_from(boundaries);
    }

    // Turn
    if let Some(capacity) = toml.turn.queue_capacity {
        config.queue_capacity = capacity;
    }
    if let Some(max) = toml.turn.max_input_chars {
        config.max_input_chars = max;
    }

    // Contract
    if toml.contract.path.is_some() {
        config.contract_path.clone_from(&toml.contract.path);
    }

    Ok(())
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut BrainConfig, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(addr) = env("BRAIN_BIND") {
        config.server.bind_address = addr;
        config.source = ConfigSource::Env;
    }
    if let Some(kind) = env("BRAIN_PRODUCER") {
        config.producer.kind = kind.parse()?;
        config.source = ConfigSource::Env;
    }

    // BRAIN_MODEL wins; OPENAI_MODEL only names models for the OpenAI producer
    let is_openai = config.producer.kind == ProducerKind::OpenAi;
    let model = env("BRAIN_MODEL").or_else(|| env("OPENAI_MODEL").filter(|_| is_openai));
    if let Some(model) = model {
        config.producer.model = Some(model);
        config.source = ConfigSource::Env;
    }
    if let Some(url) = env("OPENAI_BASE_URL") {
        config.producer.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(key) = env("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
        config.producer.api_key = Some(key);
    }
    if let Some(host) = env("OLLAMA_HOST") {
        config.producer.host = host;
        config.source = ConfigSource::Env;
    }
    if let Some(port) = env("OLLAMA_PORT") {
        if let Ok(p) = port.parse::<u16>() {
            config.producer.port = p;
            config.source = ConfigSource::Env;
        } else {
            tracing::warn!(value = %port, "Ignoring invalid OLLAMA_PORT");
        }
    }
    if let Some(path) = env("BRAIN_CONTRACT") {
        config.contract_path = Some(PathBuf::from(path));
        config.source = ConfigSource::Env;
    }

    Ok(())
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Bind address override
    pub bind_address: Option<String>,
    /// Producer kind override
    pub producer_kind: Option<ProducerKind>,
    /// Model override
    pub model: Option<String>,
    /// Contract path override
    pub contract_path: Option<PathBuf>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bind address override
    #[must_use]
    pub fn with_bind_address(mut self, addr: impl Into<String>) -> Self {
        self.bind_address = Some(addr.into());
        self
    }

    /// Set producer kind override
    #[must_use]
    pub fn with_producer_kind(mut self, kind: ProducerKind) -> Self {
        self.producer_kind = Some(kind);
        self
    }

    /// Set model override
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set contract path override
    #[must_use]
    pub fn with_contract_path(mut self, path: PathBuf) -> Self {
        self.contract_path = Some(path);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut BrainConfig) {
        if self.bind_address.is_some()
            || self.producer_kind.is_some()
            || self.model.is_some()
            || self.contract_path.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref addr) = self.bind_address {
            config.server.bind_address.clone_from(addr);
        }
        if let Some(kind) = self.producer_kind {
            config.producer.kind = kind;
        }
        if self.model.is_some() {
            config.producer.model.clone_from(&self.model);
        }
        if self.contract_path.is_some() {
            config.contract_path.clone_from(&self.contract_path);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn write_toml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{content}").unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = BrainConfig::default();

        assert_eq!(config.server.bind_address, "0.0.0.0:8765");
        assert_eq!(config.server.max_connections, 32);
        assert_eq!(config.server.send_timeout, Duration::from_secs(2));
        assert_eq!(config.producer.kind, ProducerKind::OpenAi);
        assert_eq!(config.producer.effective_model(), "gpt-4o-mini");
        assert_eq!(config.emotion.hold_window, Duration::from_millis(1500));
        assert_eq!(config.boundaries, DEFAULT_BOUNDARIES);
        assert_eq!(config.queue_capacity, 8);
        assert!(config.contract_path.is_none());
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            load_config_with_env(Some(dir.path().join("brain.toml")), no_env).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let file = write_toml(
            r#"
            [server]
            bind_address = "127.0.0.1:9000"
            max_connections = 4

            [producer]
            kind = "ollama"
            port = 11500

            [emotion]
            hold_window_ms = 3000
            min_signal_chars = 0

            [streaming]
            boundaries = ".!"

            [turn]
            queue_capacity = 2

            [contract]
            path = "/tmp/faceContract.json"
            "#,
        );

        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();

        assert_eq!(config.source(), ConfigSource::File);
        assert_eq!(config.server.bind_address, "127.0.0.1:9000");
        assert_eq!(config.server.max_connections, 4);
        assert_eq!(config.producer.kind, ProducerKind::Ollama);
        assert_eq!(config.producer.port, 11500);
        assert_eq!(config.producer.effective_model(), "llama3.2");
        assert_eq!(config.emotion.hold_window, Duration::from_millis(3000));
        assert_eq!(config.emotion.min_signal_chars, 0);
        assert_eq!(config.boundaries, ".!");
        assert_eq!(config.queue_capacity, 2);
        assert_eq!(
            config.contract_path,
            Some(PathBuf::from("/tmp/faceContract.json"))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_producer_kind_in_file() {
        let file = write_toml("[producer]\nkind = \"gpt-in-a-box\"\n");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_invalid_toml() {
        let file = write_toml("[server\nbind_address = ");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_env_overrides_file() {
        let file = write_toml("[server]\nbind_address = \"127.0.0.1:9000\"\n");
        let env = env_from(&[
            ("BRAIN_BIND", "127.0.0.1:7000"),
            ("OPENAI_MODEL", "gpt-4o"),
            ("OPENAI_API_KEY", "sk-test"),
        ]);

        let config = load_config_with_env(Some(file.path().to_path_buf()), env).unwrap();

        assert_eq!(config.source(), ConfigSource::Env);
        assert_eq!(config.server.bind_address, "127.0.0.1:7000");
        assert_eq!(config.producer.effective_model(), "gpt-4o");
        assert_eq!(config.producer.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_brain_model_beats_openai_model() {
        let env = env_from(&[("OPENAI_MODEL", "gpt-4o"), ("BRAIN_MODEL", "llama3.1")]);
        let config = load_config_with_env(None, env).unwrap();
        assert_eq!(config.producer.model.as_deref(), Some("llama3.1"));
    }

    #[test]
    fn test_openai_model_ignored_for_ollama() {
        let env = env_from(&[("BRAIN_PRODUCER", "ollama"), ("OPENAI_MODEL", "gpt-4o")]);
        let config = load_config_with_env(None, env).unwrap();
        assert_eq!(config.producer.kind, ProducerKind::Ollama);
        assert!(config.producer.model.is_none());
        assert_ne!(config.producer.effective_model(), "gpt-4o");
    }

    #[test]
    fn test_blank_api_key_is_ignored() {
        let config = load_config_with_env(None, env_from(&[("OPENAI_API_KEY", "  ")])).unwrap();
        assert!(config.producer.api_key.is_none());
    }

    #[test]
    fn test_invalid_port_env_is_ignored() {
        let config = load_config_with_env(None, env_from(&[("OLLAMA_PORT", "eleven")])).unwrap();
        assert_eq!(config.producer.port, 11434);
    }

    #[test]
    fn test_cli_overrides() {
        let mut config =
            load_config_with_env(None, env_from(&[("BRAIN_PRODUCER", "ollama")])).unwrap();
        assert_eq!(config.producer.kind, ProducerKind::Ollama);

        ConfigOverrides::new()
            .with_producer_kind(ProducerKind::None)
            .with_bind_address("127.0.0.1:0")
            .with_contract_path(PathBuf::from("contract.json"))
            .apply(&mut config);

        assert_eq!(config.source(), ConfigSource::Cli);
        assert_eq!(config.producer.kind, ProducerKind::None);
        assert_eq!(config.server.bind_address, "127.0.0.1:0");
        assert_eq!(config.contract_path, Some(PathBuf::from("contract.json")));
    }

    #[test]
    fn test_empty_overrides_keep_source() {
        let mut config = BrainConfig::default();
        ConfigOverrides::new().apply(&mut config);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_validation() {
        let mut config = BrainConfig::default();
        config.queue_capacity = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(msg)) if msg.contains("queue_capacity")
        ));

        let mut config = BrainConfig::default();
        config.boundaries.clear();
        assert!(config.validate().is_err());

        let mut config = BrainConfig::default();
        config.server.send_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_turn_settings() {
        let mut config = BrainConfig::default();
        config.boundaries = ".?".to_string();
        config.producer.model = Some("tiny".to_string());

        let settings = config.turn_settings();
        assert_eq!(settings.boundaries, vec!['.', '?']);
        assert_eq!(settings.model, "tiny");
        assert_eq!(settings.emotion, config.emotion);
    }

    #[test]
    fn test_producer_kind_parse() {
        assert_eq!("OpenAI".parse::<ProducerKind>().unwrap(), ProducerKind::OpenAi);
        assert_eq!(" ollama ".parse::<ProducerKind>().unwrap(), ProducerKind::Ollama);
        assert_eq!("none".parse::<ProducerKind>().unwrap(), ProducerKind::None);
        assert!("other".parse::<ProducerKind>().is_err());
        assert_eq!(ProducerKind::OpenAi.to_string(), "openai");
    }
}
