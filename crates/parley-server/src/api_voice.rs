//! Voice session endpoints and the voice-agent webhook.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::to_bytes,
    extract::{ConnectInfo, Extension, Json, Path, Request},
};

use crate::api::ApiError;
use crate::session::{EndedSession, NextQuestion, VoiceSessionView};
use crate::webhook::{WebhookReply, SIGNATURE_HEADER};
use crate::AppState;

/// Webhook payloads are small JSON documents.
const MAX_WEBHOOK_BODY_BYTES: usize = 256 * 1024;

/// Handler for `POST /api/interviews/{id}/voice/session`.
pub async fn create_session_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(interview_id): Path<i64>,
) -> Result<Json<VoiceSessionView>, ApiError> {
    Ok(Json(state.sessions.create_session(interview_id).await?))
}

/// Handler for `DELETE /api/interviews/{id}/voice/session`.
pub async fn end_session_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(interview_id): Path<i64>,
) -> Result<Json<EndedSession>, ApiError> {
    Ok(Json(state.sessions.end_session(interview_id).await?))
}

/// Handler for `GET /api/interviews/{id}/voice/status`.
pub async fn session_status_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(interview_id): Path<i64>,
) -> Result<Json<VoiceSessionView>, ApiError> {
    Ok(Json(state.sessions.session_status(interview_id).await?))
}

/// Handler for `GET /api/interviews/{id}/voice/next-question`.
pub async fn next_question_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(interview_id): Path<i64>,
) -> Result<Json<NextQuestion>, ApiError> {
    Ok(Json(state.sessions.get_next_question(interview_id).await?))
}

/// Handler for `POST /api/webhooks/voice`.
///
/// The signature covers the exact bytes received, so the body is read raw
/// and parsed only after verification.
pub async fn voice_webhook_handler(
    Extension(state): Extension<Arc<AppState>>,
    req: Request,
) -> Result<Json<WebhookReply>, ApiError> {
    let source = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = to_bytes(req.into_body(), MAX_WEBHOOK_BODY_BYTES)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read webhook body: {e}")))?;

    let reply = state
        .webhooks
        .handle(&body, signature.as_deref(), &source)
        .await?;
    Ok(Json(reply))
}
