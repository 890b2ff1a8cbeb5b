//! Inbound webhook event model.
//!
//! The voice agent posts `{"type": ..., "interviewId": ..., "data": {...}}`.
//! Event types and tool names are closed enums with an explicit `Unknown`
//! branch, so dispatch is an exhaustive `match` rather than string lookups.

use crate::voice::VoiceMetadata;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw webhook delivery as received on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    /// Event type tag, matched case-insensitively.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Correlation key: the interview this event belongs to.
    #[serde(rename = "interviewId", alias = "interview_id")]
    pub interview_id: i64,
    /// Payload, shape depends on `event_type`.
    #[serde(default)]
    pub data: Value,
}

impl WebhookEnvelope {
    /// Classifies the event type tag.
    pub fn kind(&self) -> WebhookEventKind {
        WebhookEventKind::parse(&self.event_type)
    }
}

/// Classified webhook event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventKind {
    AgentMessage,
    AgentToolCall,
    ConversationStarted,
    ConversationEnded,
    Error,
    /// Any tag not listed above; carries the original tag for logging.
    Unknown(String),
}

impl WebhookEventKind {
    /// Parses an event tag. `conversation_started`, `CONVERSATION_STARTED` and
    /// `conversation-started` all name the same event.
    pub fn parse(tag: &str) -> Self {
        let normalized = tag.trim().replace('-', "_").to_ascii_uppercase();
        match normalized.as_str() {
            "AGENT_MESSAGE" => Self::AgentMessage,
            "AGENT_TOOL_CALL" => Self::AgentToolCall,
            "CONVERSATION_STARTED" => Self::ConversationStarted,
            "CONVERSATION_ENDED" => Self::ConversationEnded,
            "ERROR" => Self::Error,
            _ => Self::Unknown(tag.to_string()),
        }
    }

    /// Canonical label used in logs.
    pub fn label(&self) -> &str {
        match self {
            Self::AgentMessage => "AGENT_MESSAGE",
            Self::AgentToolCall => "AGENT_TOOL_CALL",
            Self::ConversationStarted => "CONVERSATION_STARTED",
            Self::ConversationEnded => "CONVERSATION_ENDED",
            Self::Error => "ERROR",
            Self::Unknown(tag) => tag,
        }
    }
}

/// Tools the remote agent may call back into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolName {
    GetNextQuestion,
    SaveAnswer,
    EndInterview,
    Unknown(String),
}

impl ToolName {
    /// Parses a tool name, ignoring case and underscores
    /// (`getNextQuestion` == `get_next_question`).
    pub fn parse(name: &str) -> Self {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "getnextquestion" => Self::GetNextQuestion,
            "saveanswer" => Self::SaveAnswer,
            "endinterview" => Self::EndInterview,
            _ => Self::Unknown(name.to_string()),
        }
    }

    /// The name advertised to the agent in session tool definitions.
    pub fn wire_name(&self) -> &str {
        match self {
            Self::GetNextQuestion => "getNextQuestion",
            Self::SaveAnswer => "saveAnswer",
            Self::EndInterview => "endInterview",
            Self::Unknown(name) => name,
        }
    }
}

/// `data` payload of an `AGENT_TOOL_CALL` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(alias = "tool_name", alias = "name")]
    pub tool_name: String,
    #[serde(default)]
    pub parameters: Value,
}

impl ToolCall {
    pub fn tool(&self) -> ToolName {
        ToolName::parse(&self.tool_name)
    }
}

/// Parameters of the `saveAnswer` tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveAnswerParams {
    #[serde(alias = "question_id")]
    pub question_id: i64,
    #[serde(alias = "answer", alias = "text")]
    pub transcript: String,
    #[serde(flatten)]
    pub metadata: VoiceMetadata,
}
