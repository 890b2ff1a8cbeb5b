//! Server configuration loading from file and environment variables.

use parley_db::DbRuntimeSettings;
use parley_interview::{ScoringPolicy, ThresholdComparison};
use parley_voice::{LlmConfig, SttConfig, VoiceAgentConfig, VoiceQualityConfig};
use serde::Deserialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Remote conversational voice agent.
    #[serde(default)]
    pub voice_agent: VoiceAgentConfig,

    /// Answer quality limits and synthesis settings for voice sessions.
    #[serde(default)]
    pub voice_quality: VoiceQualityConfig,

    /// Text-generation oracle used for formatting and grading.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Speech-to-text oracle.
    #[serde(default)]
    pub stt: SttConfig,

    #[serde(default)]
    pub evaluation: EvaluationConfig,

    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "parley_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Evaluation scheduler settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationConfig {
    /// Seconds between passes; 0 disables the scheduler.
    #[serde(default = "default_evaluation_interval")]
    pub interval_seconds: u64,

    /// Pass threshold (0-100) for positions without their own `min_score`.
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,

    #[serde(default)]
    pub comparison: ThresholdComparison,
}

/// Inbound webhook authentication.
#[derive(Clone, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_validate_signature")]
    pub validate_signature: bool,

    /// Shared HMAC secret. Empty means unauthenticated (degraded) mode.
    #[serde(default)]
    pub secret: String,
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("validate_signature", &self.validate_signature)
            .field(
                "secret",
                &if self.secret.is_empty() { "" } else { "[redacted]" },
            )
            .finish()
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "parley.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    DbRuntimeSettings::default().busy_timeout_ms
}

fn default_pool_max_size() -> u32 {
    DbRuntimeSettings::default().pool_max_size
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_evaluation_interval() -> u64 {
    300
}

fn default_pass_threshold() -> f64 {
    parley_interview::scoring::DEFAULT_PASS_THRESHOLD
}

fn default_validate_signature() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl DatabaseConfig {
    pub fn runtime_settings(&self) -> DbRuntimeSettings {
        DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size: self.pool_max_size,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_evaluation_interval(),
            pass_threshold: default_pass_threshold(),
            comparison: ThresholdComparison::default(),
        }
    }
}

impl EvaluationConfig {
    pub fn scoring_policy(&self) -> ScoringPolicy {
        ScoringPolicy {
            pass_threshold: self.pass_threshold,
            comparison: self.comparison,
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            validate_signature: default_validate_signature(),
            secret: String::new(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `PARLEY_HOST`, `PARLEY_PORT`
/// - `PARLEY_DB_PATH`
/// - `PARLEY_LOG_LEVEL`, `PARLEY_LOG_JSON` ("true" or "1")
/// - `PARLEY_VOICE_AGENT_API_KEY`, `PARLEY_VOICE_AGENT_ID`
/// - `PARLEY_LLM_API_KEY`, `PARLEY_STT_API_KEY`
/// - `PARLEY_WEBHOOK_SECRET`, `PARLEY_WEBHOOK_VALIDATE` ("true" or "1")
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed, or
/// if the resulting values are out of range.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    let flag = |value: String| value == "true" || value == "1";

    if let Some(host) = var("PARLEY_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("PARLEY_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(db_path) = var("PARLEY_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = var("PARLEY_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("PARLEY_LOG_JSON") {
        config.logging.json = flag(json);
    }
    if let Some(key) = var("PARLEY_VOICE_AGENT_API_KEY") {
        config.voice_agent.api_key = key;
    }
    if let Some(agent_id) = var("PARLEY_VOICE_AGENT_ID") {
        config.voice_agent.agent_id = agent_id;
    }
    if let Some(key) = var("PARLEY_LLM_API_KEY") {
        config.llm.api_key = key;
    }
    if let Some(key) = var("PARLEY_STT_API_KEY") {
        config.stt.api_key = key;
    }
    if let Some(secret) = var("PARLEY_WEBHOOK_SECRET") {
        config.webhook.secret = secret;
    }
    if let Some(validate) = var("PARLEY_WEBHOOK_VALIDATE") {
        config.webhook.validate_signature = flag(validate);
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if !(0.0..=100.0).contains(&config.evaluation.pass_threshold) {
        return Err(ConfigError::Invalid(format!(
            "evaluation.pass_threshold must be within 0-100, got {}",
            config.evaluation.pass_threshold
        )));
    }
    if !(0.0..=1.0).contains(&config.voice_quality.min_confidence) {
        return Err(ConfigError::Invalid(format!(
            "voice_quality.min_confidence must be within 0-1, got {}",
            config.voice_quality.min_confidence
        )));
    }
    if config.database.pool_max_size == 0 {
        return Err(ConfigError::Invalid(
            "database.pool_max_size must be at least 1".to_string(),
        ));
    }
    Ok(())
}
