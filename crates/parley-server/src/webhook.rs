//! Inbound webhook events from the voice agent.
//!
//! Deliveries are authenticated with an HMAC-SHA256 signature over the raw
//! body (base64, header `X-Webhook-Signature`), classified into a
//! [`WebhookEventKind`] and routed to the state machine or the session
//! orchestrator. Every transition is conditional on the current state, so
//! duplicate and out-of-order deliveries are harmless.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use hmac::{Hmac, Mac};
use parley_db::DbPool;
use parley_interview::{store, InterviewError, InterviewMachine};
use parley_types::{SaveAnswerParams, ToolCall, ToolName, WebhookEnvelope, WebhookEventKind};
use serde::Serialize;
use serde_json::{json, Value};
use sha2::Sha256;
use thiserror::Error;

use crate::error::{run_blocking, EngineError};
use crate::session::SessionOrchestrator;
use crate::stats::{emit, StatsSink, UsageEvent};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the base64 HMAC-SHA256 of the request body.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook authentication failed: {0}")]
    Auth(String),

    #[error("malformed webhook payload: {0}")]
    Malformed(String),

    #[error("unknown webhook event type: {0}")]
    UnknownEvent(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<InterviewError> for WebhookError {
    fn from(err: InterviewError) -> Self {
        Self::Engine(err.into())
    }
}

/// Checks webhook signatures against the shared secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    validate: bool,
    secret: Option<Vec<u8>>,
}

impl fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("validate", &self.validate)
            .field("secret", &self.secret.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl WebhookVerifier {
    /// A blank secret counts as no secret.
    pub fn new(validate: bool, secret: &str) -> Self {
        let secret = (!secret.trim().is_empty()).then(|| secret.as_bytes().to_vec());
        if !validate || secret.is_none() {
            tracing::warn!(
                validate,
                secret_configured = secret.is_some(),
                "webhook signature validation is off; the endpoint accepts unauthenticated events"
            );
        }
        Self { validate, secret }
    }

    /// Whether signatures are actually enforced.
    pub fn enforcing(&self) -> bool {
        self.validate && self.secret.is_some()
    }

    /// Computes the signature header value for `body`; `None` without a secret.
    pub fn sign(&self, body: &[u8]) -> Option<String> {
        let mut mac = self.mac()?;
        mac.update(body);
        Some(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Verifies `signature` against `body`.
    ///
    /// In degraded mode (validation off or no secret) every delivery is
    /// accepted with a warning.
    pub fn verify(
        &self,
        body: &[u8],
        signature: Option<&str>,
        source: &str,
    ) -> Result<(), WebhookError> {
        let Some(mut mac) = self.mac().filter(|_| self.validate) else {
            tracing::warn!(source, "accepting unauthenticated webhook (degraded mode)");
            return Ok(());
        };

        let Some(signature) = signature else {
            tracing::warn!(source, "webhook rejected: missing signature header");
            return Err(WebhookError::Auth("missing signature".to_string()));
        };
        let signature = signature.trim();
        let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
        let provided = base64::engine::general_purpose::STANDARD
            .decode(signature)
            .map_err(|_| {
                tracing::warn!(source, "webhook rejected: signature is not valid base64");
                WebhookError::Auth("invalid signature encoding".to_string())
            })?;

        mac.update(body);
        // verify_slice compares in constant time.
        mac.verify_slice(&provided).map_err(|_| {
            tracing::warn!(source, "webhook rejected: signature mismatch");
            WebhookError::Auth("signature mismatch".to_string())
        })
    }

    fn mac(&self) -> Option<HmacSha256> {
        let secret = self.secret.as_deref()?;
        HmacSha256::new_from_slice(secret).ok()
    }
}

/// Response body for a processed webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookReply {
    pub event_type: String,
    pub interview_id: i64,
    /// Whether the event changed any state.
    pub changed: bool,
    /// Tool result handed back to the agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

pub struct WebhookDispatcher {
    pool: DbPool,
    machine: InterviewMachine,
    sessions: Arc<SessionOrchestrator>,
    verifier: WebhookVerifier,
    stats: Arc<dyn StatsSink>,
}

impl WebhookDispatcher {
    pub fn new(
        pool: DbPool,
        machine: InterviewMachine,
        sessions: Arc<SessionOrchestrator>,
        verifier: WebhookVerifier,
        stats: Arc<dyn StatsSink>,
    ) -> Self {
        Self {
            pool,
            machine,
            sessions,
            verifier,
            stats,
        }
    }

    pub fn verifier(&self) -> &WebhookVerifier {
        &self.verifier
    }

    /// Authenticates, parses and routes one delivery.
    pub async fn handle(
        &self,
        body: &[u8],
        signature: Option<&str>,
        source: &str,
    ) -> Result<WebhookReply, WebhookError> {
        self.verifier.verify(body, signature, source)?;

        let envelope: WebhookEnvelope =
            serde_json::from_slice(body).map_err(|e| WebhookError::Malformed(e.to_string()))?;
        let kind = envelope.kind();
        if let WebhookEventKind::Unknown(tag) = &kind {
            tracing::warn!(event_type = %tag, source, "unknown webhook event type");
            return Err(WebhookError::UnknownEvent(tag.clone()));
        }

        let interview_id = envelope.interview_id;
        run_blocking(&self.pool, move |conn| {
            store::get_interview(conn, interview_id)?;
            Ok(())
        })
        .await?;

        tracing::debug!(interview_id, event_type = kind.label(), source, "webhook received");

        let (changed, result) = match &kind {
            WebhookEventKind::ConversationStarted => {
                let machine = self.machine.clone();
                let outcome = run_blocking(&self.pool, move |conn| {
                    Ok(machine.mark_conversation_started(conn, interview_id)?)
                })
                .await?;
                (outcome.changed, None)
            }
            WebhookEventKind::ConversationEnded => (self.conversation_ended(interview_id).await?, None),
            WebhookEventKind::AgentToolCall => self.tool_call(interview_id, &envelope.data).await?,
            WebhookEventKind::AgentMessage => {
                let text = envelope
                    .data
                    .get("message")
                    .or_else(|| envelope.data.get("text"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                tracing::info!(interview_id, message = text, "agent message");
                (false, None)
            }
            WebhookEventKind::Error => {
                let reason = envelope
                    .data
                    .get("message")
                    .or_else(|| envelope.data.get("error"))
                    .and_then(Value::as_str)
                    .unwrap_or("unspecified");
                tracing::error!(interview_id, reason, "voice agent reported an error");
                let machine = self.machine.clone();
                let outcome = run_blocking(&self.pool, move |conn| {
                    Ok(machine.mark_failed(conn, interview_id)?)
                })
                .await?;
                (outcome.changed, None)
            }
            WebhookEventKind::Unknown(_) => (false, None),
        };

        Ok(WebhookReply {
            event_type: kind.label().to_string(),
            interview_id,
            changed,
            result,
        })
    }

    async fn conversation_ended(&self, interview_id: i64) -> Result<bool, WebhookError> {
        let machine = self.machine.clone();
        let (ended, voice_end) = run_blocking(&self.pool, move |conn| {
            let ended = machine.mark_conversation_ended(conn, interview_id)?;
            let voice_end = if ended.interview.voice_enabled {
                Some(machine.record_voice_end(conn, interview_id)?)
            } else {
                None
            };
            Ok((ended, voice_end))
        })
        .await?;

        let mut changed = ended.changed;
        if let Some(voice_end) = voice_end.filter(|outcome| outcome.changed) {
            changed = true;
            emit(
                self.stats.as_ref(),
                UsageEvent::VoiceSessionEnded {
                    interview_id,
                    duration_seconds: voice_end.interview.voice_total_duration,
                },
            );
        }
        Ok(changed)
    }

    async fn tool_call(
        &self,
        interview_id: i64,
        data: &Value,
    ) -> Result<(bool, Option<Value>), WebhookError> {
        let call: ToolCall = serde_json::from_value(data.clone())
            .map_err(|e| WebhookError::Malformed(format!("tool call: {e}")))?;

        match call.tool() {
            ToolName::GetNextQuestion => {
                let next = self.sessions.get_next_question(interview_id).await?;
                Ok((false, Some(to_value(&next)?)))
            }
            ToolName::SaveAnswer => {
                let params: SaveAnswerParams = serde_json::from_value(call.parameters)
                    .map_err(|e| WebhookError::Malformed(format!("saveAnswer parameters: {e}")))?;
                let question_id = params.question_id;
                match self.sessions.save_voice_answer(interview_id, params).await {
                    Ok(saved) => Ok((true, Some(to_value(&saved)?))),
                    Err(EngineError::Interview(InterviewError::AlreadyAnswered { .. })) => {
                        tracing::info!(interview_id, question_id, "duplicate saveAnswer ignored");
                        Ok((
                            false,
                            Some(json!({ "status": "already_answered", "questionId": question_id })),
                        ))
                    }
                    Err(e) => Err(e.into()),
                }
            }
            ToolName::EndInterview => {
                let view = self.sessions.end_interview(interview_id).await?;
                Ok((true, Some(to_value(&view)?)))
            }
            ToolName::Unknown(name) => {
                tracing::warn!(interview_id, tool = %name, "ignoring unknown tool call");
                Ok((false, None))
            }
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, WebhookError> {
    serde_json::to_value(value)
        .map_err(|e| WebhookError::Engine(EngineError::Internal(format!("serialize tool result: {e}"))))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"type":"CONVERSATION_STARTED","interviewId":1}"#;

    #[test]
    fn valid_signature_is_accepted() {
        let verifier = WebhookVerifier::new(true, "s3cret");
        let signature = verifier.sign(BODY).unwrap();
        verifier.verify(BODY, Some(&signature), "test").unwrap();
        verifier
            .verify(BODY, Some(&format!("sha256={signature}")), "test")
            .unwrap();
    }

    #[test]
    fn tampered_body_is_rejected() {
        let verifier = WebhookVerifier::new(true, "s3cret");
        let signature = verifier.sign(BODY).unwrap();
        let tampered = br#"{"type":"CONVERSATION_STARTED","interviewId":2}"#;
        let err = verifier.verify(tampered, Some(&signature), "test").unwrap_err();
        assert!(matches!(err, WebhookError::Auth(_)));
    }

    #[test]
    fn signature_from_another_secret_is_rejected() {
        let ours = WebhookVerifier::new(true, "s3cret");
        let theirs = WebhookVerifier::new(true, "other");
        let signature = theirs.sign(BODY).unwrap();
        assert!(ours.verify(BODY, Some(&signature), "test").is_err());
    }

    #[test]
    fn missing_or_garbled_signature_is_rejected_when_enforcing() {
        let verifier = WebhookVerifier::new(true, "s3cret");
        assert!(verifier.enforcing());
        assert!(matches!(
            verifier.verify(BODY, None, "test"),
            Err(WebhookError::Auth(_))
        ));
        assert!(matches!(
            verifier.verify(BODY, Some("%%%not-base64"), "test"),
            Err(WebhookError::Auth(_))
        ));
    }

    #[test]
    fn degraded_mode_accepts_anything() {
        let disabled = WebhookVerifier::new(false, "s3cret");
        assert!(!disabled.enforcing());
        disabled.verify(BODY, Some("bogus"), "test").unwrap();

        let no_secret = WebhookVerifier::new(true, "  ");
        assert!(!no_secret.enforcing());
        assert!(no_secret.sign(BODY).is_none());
        no_secret.verify(BODY, None, "test").unwrap();
    }

    #[test]
    fn debug_output_redacts_secret() {
        let verifier = WebhookVerifier::new(true, "s3cret");
        let printed = format!("{verifier:?}");
        assert!(!printed.contains("s3cret"));
        assert!(printed.contains("[redacted]"));
    }
}
