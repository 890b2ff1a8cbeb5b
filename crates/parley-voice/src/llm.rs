//! Text-generation oracle.
//!
//! [`TextGenerator`] is what the transcription pipeline and the evaluation
//! scheduler depend on. [`HttpTextGenerator`] talks to any OpenAI-compatible
//! `/v1/chat/completions` endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{check_status, VoiceError};
use crate::retry::RetryPolicy;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generates a completion for `prompt`, optionally steered by a system
    /// instruction.
    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String, VoiceError>;

    /// Generates a completion and splits it into non-blank lines.
    async fn generate_list(&self, prompt: &str) -> Result<Vec<String>, VoiceError> {
        let text = self.generate(prompt, None).await?;
        Ok(split_lines(&text))
    }

    /// Liveness check; never errors.
    async fn is_available(&self) -> bool;
}

/// Splits a completion into trimmed, non-blank lines.
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat completion API.
#[derive(Debug, Clone)]
pub struct HttpTextGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl HttpTextGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self, VoiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build LLM client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            retry: config.retry_policy(),
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            request
        } else {
            request.bearer_auth(&self.api_key)
        }
    }

    async fn complete_once(&self, body: &ChatRequest<'_>) -> Result<String, VoiceError> {
        let response = self
            .authorize(
                self.client
                    .post(format!("{}/v1/chat/completions", self.base_url))
                    .json(body),
            )
            .send()
            .await
            .map_err(|e| VoiceError::from_transport("chat completion", e))?;
        let response = check_status("chat completion", response).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::Decode(format!("chat completion: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| VoiceError::Decode("chat completion returned no choices".to_string()))
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String, VoiceError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: 0.2,
        };

        self.retry
            .run("chat completion", || self.complete_once(&body))
            .await
    }

    async fn is_available(&self) -> bool {
        let request = self
            .authorize(self.client.get(format!("{}/v1/models", self.base_url)));
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "LLM health check failed");
                false
            }
        }
    }
}
