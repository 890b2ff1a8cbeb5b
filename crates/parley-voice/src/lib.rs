//! Outbound integrations for Parley.
//!
//! Three remote collaborators sit behind traits so the engine can be driven
//! by in-process fakes in tests:
//!
//! - [`VoiceAgent`]: the conversational agent that runs the spoken interview
//!   and calls back through webhook tool calls.
//! - [`SpeechToText`]: turns an uploaded answer clip into raw text, over HTTP
//!   or through a local whisper.cpp-compatible binary.
//! - [`TextGenerator`]: an OpenAI-compatible LLM used to tidy transcripts and
//!   to grade answers.
//!
//! Every HTTP call carries a client timeout and goes through a bounded
//! [`RetryPolicy`]. Errors are classified so callers can tell a rejected
//! request (4xx) from a service that is down, slow or returning 5xx.

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod retry;
pub mod stt;

pub use agent::{
    interview_tools, HttpVoiceAgent, SessionHandle, SessionRequest, ToolDefinition, VoiceAgent,
    VoiceSettings,
};
pub use config::{LlmConfig, SttBackend, SttConfig, VoiceAgentConfig, VoiceQualityConfig};
pub use error::VoiceError;
pub use llm::{HttpTextGenerator, TextGenerator};
pub use retry::RetryPolicy;
pub use stt::{build_speech_to_text, HttpSpeechToText, SpeechToText, WhisperCliStt};
