//! Settings for the remote voice agent, the STT and LLM oracles, and the
//! soft quality limits applied to voice answers.
//!
//! Every struct deserializes with defaults for missing fields so a partial
//! `config.toml` section is enough. Secrets never serialize and are redacted
//! in `Debug` output.

use parley_types::VoiceProfile;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

fn default_agent_base_url() -> String {
    "http://localhost:8300".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_voice_id() -> String {
    "default".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

/// Connection settings for the remote conversational voice agent.
#[derive(Clone, Serialize, Deserialize)]
pub struct VoiceAgentConfig {
    #[serde(default = "default_agent_base_url")]
    pub base_url: String,

    #[serde(default, skip_serializing)]
    pub api_key: String,

    /// Remote agent the sessions are created for.
    #[serde(default)]
    pub agent_id: String,

    #[serde(default = "default_voice_id")]
    pub voice_id: String,

    #[serde(default = "default_language")]
    pub language: String,

    /// Public URL of this server's webhook endpoint, handed to the agent as the
    /// tool callback target.
    #[serde(default)]
    pub webhook_url: String,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for VoiceAgentConfig {
    fn default() -> Self {
        Self {
            base_url: default_agent_base_url(),
            api_key: String::new(),
            agent_id: String::new(),
            voice_id: default_voice_id(),
            language: default_language(),
            webhook_url: String::new(),
            timeout_seconds: default_timeout_seconds(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl fmt::Debug for VoiceAgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceAgentConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("agent_id", &self.agent_id)
            .field("voice_id", &self.voice_id)
            .field("language", &self.language)
            .field("webhook_url", &self.webhook_url)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .finish()
    }
}

impl VoiceAgentConfig {
    /// Sessions can only be created with both an api key and an agent id.
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.agent_id.trim().is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_millis(self.retry_backoff_ms))
    }
}

fn default_llm_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_llm_model() -> String {
    "llama3".to_string()
}

/// An OpenAI-compatible text-generation endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default, skip_serializing)]
    pub api_key: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: String::new(),
            model: default_llm_model(),
            timeout_seconds: default_timeout_seconds(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .finish()
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_millis(self.retry_backoff_ms))
    }
}

/// Which speech-to-text implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SttBackend {
    /// A transcription service reachable over HTTP.
    #[default]
    Http,
    /// A local whisper.cpp-compatible binary fed through stdin.
    WhisperCli,
}

fn default_stt_base_url() -> String {
    "http://localhost:8200".to_string()
}

fn default_stt_timeout_seconds() -> u64 {
    120
}

fn default_whisper_binary() -> PathBuf {
    PathBuf::from("whisper-cli")
}

fn default_whisper_model() -> PathBuf {
    PathBuf::from("models/ggml-base.en.bin")
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SttConfig {
    #[serde(default)]
    pub backend: SttBackend,

    #[serde(default = "default_stt_base_url")]
    pub base_url: String,

    #[serde(default, skip_serializing)]
    pub api_key: String,

    #[serde(default = "default_stt_timeout_seconds")]
    pub timeout_seconds: u64,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Used by the `whisper_cli` backend.
    #[serde(default = "default_whisper_binary")]
    pub binary_path: PathBuf,

    /// Used by the `whisper_cli` backend.
    #[serde(default = "default_whisper_model")]
    pub model_path: PathBuf,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            backend: SttBackend::default(),
            base_url: default_stt_base_url(),
            api_key: String::new(),
            timeout_seconds: default_stt_timeout_seconds(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            binary_path: default_whisper_binary(),
            model_path: default_whisper_model(),
        }
    }
}

impl fmt::Debug for SttConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SttConfig")
            .field("backend", &self.backend)
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("timeout_seconds", &self.timeout_seconds)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("binary_path", &self.binary_path)
            .field("model_path", &self.model_path)
            .finish()
    }
}

impl SttConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_millis(self.retry_backoff_ms))
    }
}

fn default_max_answer_duration_secs() -> f64 {
    300.0
}

fn default_min_confidence() -> f64 {
    0.6
}

fn default_max_session_minutes() -> u64 {
    60
}

fn default_response_timeout_secs() -> u64 {
    30
}

fn default_stability() -> f32 {
    0.5
}

fn default_similarity_boost() -> f32 {
    0.75
}

fn default_use_speaker_boost() -> bool {
    true
}

/// Soft limits for voice answers plus the synthesis settings handed to the
/// remote agent. Limits only produce warnings; they never reject an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceQualityConfig {
    #[serde(default = "default_max_answer_duration_secs")]
    pub max_answer_duration_secs: f64,

    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    #[serde(default = "default_max_session_minutes")]
    pub max_session_minutes: u64,

    /// How long the agent waits for the candidate before prompting again.
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,

    #[serde(default = "default_stability")]
    pub stability: f32,

    #[serde(default = "default_similarity_boost")]
    pub similarity_boost: f32,

    #[serde(default)]
    pub style: f32,

    #[serde(default = "default_use_speaker_boost")]
    pub use_speaker_boost: bool,
}

impl Default for VoiceQualityConfig {
    fn default() -> Self {
        Self {
            max_answer_duration_secs: default_max_answer_duration_secs(),
            min_confidence: default_min_confidence(),
            max_session_minutes: default_max_session_minutes(),
            response_timeout_secs: default_response_timeout_secs(),
            stability: default_stability(),
            similarity_boost: default_similarity_boost(),
            style: 0.0,
            use_speaker_boost: default_use_speaker_boost(),
        }
    }
}

impl VoiceQualityConfig {
    pub fn max_session_seconds(&self) -> u64 {
        self.max_session_minutes.saturating_mul(60)
    }

    /// The voice the agent should use: voice and language from the agent
    /// section, synthesis settings from this one, ratios clamped to `[0, 1]`.
    pub fn voice_profile(&self, agent: &VoiceAgentConfig) -> VoiceProfile {
        VoiceProfile {
            voice_id: agent.voice_id.clone(),
            language: agent.language.clone(),
            stability: self.stability,
            similarity_boost: self.similarity_boost,
            style: self.style,
            use_speaker_boost: self.use_speaker_boost,
        }
        .normalized()
    }
}
