//! Client for the remote conversational voice agent.
//!
//! The agent runs the spoken conversation and calls back into this server
//! through webhook tool calls (`getNextQuestion`, `saveAnswer`,
//! `endInterview`). This module only creates and ends remote sessions.

use async_trait::async_trait;
use parley_types::{ToolName, VoiceProfile};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::VoiceAgentConfig;
use crate::error::{check_status, VoiceError};
use crate::retry::RetryPolicy;

/// Header carrying the agent API key on every outbound request.
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// A tool the remote agent may call, delivered to `webhook_url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the tool parameters.
    pub parameters: Value,
    pub webhook_url: String,
}

/// The three tools every interview session exposes.
pub fn interview_tools(webhook_url: &str) -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: ToolName::GetNextQuestion.wire_name().to_string(),
            description: "Fetch the next unanswered interview question.".to_string(),
            parameters: json!({ "type": "object", "properties": {} }),
            webhook_url: webhook_url.to_string(),
        },
        ToolDefinition {
            name: ToolName::SaveAnswer.wire_name().to_string(),
            description: "Store the candidate's answer to the current question.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "questionId": { "type": "integer" },
                    "transcript": { "type": "string" },
                    "confidence": { "type": "number" },
                    "speakerId": { "type": "string" },
                    "emotion": { "type": "string" },
                    "durationSeconds": { "type": "number" }
                },
                "required": ["questionId", "transcript"]
            }),
            webhook_url: webhook_url.to_string(),
        },
        ToolDefinition {
            name: ToolName::EndInterview.wire_name().to_string(),
            description: "End the interview once every question is answered.".to_string(),
            parameters: json!({ "type": "object", "properties": {} }),
            webhook_url: webhook_url.to_string(),
        },
    ]
}

/// Synthesis settings in the agent's wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSettings {
    pub voice_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

impl From<&VoiceProfile> for VoiceSettings {
    fn from(profile: &VoiceProfile) -> Self {
        Self {
            voice_id: profile.voice_id.clone(),
            stability: profile.stability,
            similarity_boost: profile.similarity_boost,
            style: profile.style,
            use_speaker_boost: profile.use_speaker_boost,
        }
    }
}

/// Body of `POST /v1/sessions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub agent_id: String,
    pub interview_id: i64,
    /// System prompt for the conversation.
    pub prompt: String,
    pub first_message: String,
    pub language: String,
    pub voice: VoiceSettings,
    pub max_duration_seconds: u64,
    pub response_timeout_seconds: u64,
    pub tools: Vec<ToolDefinition>,
}

/// A session the remote agent accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    pub session_id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
}

#[async_trait]
pub trait VoiceAgent: Send + Sync {
    async fn create_session(&self, request: &SessionRequest) -> Result<SessionHandle, VoiceError>;

    async fn end_session(&self, session_id: &str) -> Result<(), VoiceError>;

    async fn is_available(&self) -> bool;
}

/// HTTP client for the agent's session API.
#[derive(Debug, Clone)]
pub struct HttpVoiceAgent {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl HttpVoiceAgent {
    pub fn new(config: &VoiceAgentConfig) -> Result<Self, VoiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build voice agent client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            retry: config.retry_policy(),
        })
    }

    async fn create_once(&self, request: &SessionRequest) -> Result<SessionHandle, VoiceError> {
        let response = self
            .client
            .post(format!("{}/v1/sessions", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| VoiceError::from_transport("create session", e))?;
        let response = check_status("create session", response).await?;
        response
            .json()
            .await
            .map_err(|e| VoiceError::Decode(format!("create session: {e}")))
    }

    async fn end_once(&self, session_id: &str) -> Result<(), VoiceError> {
        let response = self
            .client
            .delete(format!("{}/v1/sessions/{}", self.base_url, session_id))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| VoiceError::from_transport("end session", e))?;
        check_status("end session", response).await?;
        Ok(())
    }
}

#[async_trait]
impl VoiceAgent for HttpVoiceAgent {
    async fn create_session(&self, request: &SessionRequest) -> Result<SessionHandle, VoiceError> {
        // Not retried: a create that timed out may still have opened a
        // session remotely, and a second attempt would open another.
        let handle = RetryPolicy::none()
            .run("create session", || self.create_once(request))
            .await?;
        tracing::info!(
            interview_id = request.interview_id,
            session_id = %handle.session_id,
            "remote voice session created"
        );
        Ok(handle)
    }

    async fn end_session(&self, session_id: &str) -> Result<(), VoiceError> {
        self.retry
            .run("end session", || self.end_once(session_id))
            .await
    }

    async fn is_available(&self) -> bool {
        let health = self
            .client
            .get(format!("{}/v1/health", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await;
        match health {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "voice agent health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interview_tools_share_callback_url() {
        let tools = interview_tools("https://hire.example.com/api/webhooks/voice");
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["getNextQuestion", "saveAnswer", "endInterview"]);
        assert!(tools
            .iter()
            .all(|t| t.webhook_url == "https://hire.example.com/api/webhooks/voice"));
    }

    #[test]
    fn tool_names_round_trip_through_dispatch_parser() {
        for tool in interview_tools("http://localhost") {
            assert!(!matches!(ToolName::parse(&tool.name), ToolName::Unknown(_)));
        }
    }

    #[test]
    fn session_request_uses_camel_case_wire_names() {
        let request = SessionRequest {
            agent_id: "agent-1".into(),
            interview_id: 42,
            prompt: "p".into(),
            first_message: "hi".into(),
            language: "en".into(),
            voice: VoiceSettings::from(&VoiceProfile::default()),
            max_duration_seconds: 600,
            response_timeout_seconds: 30,
            tools: Vec::new(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["interviewId"], 42);
        assert_eq!(value["maxDurationSeconds"], 600);
        assert_eq!(value["voice"]["similarityBoost"], 0.75);
    }
}
