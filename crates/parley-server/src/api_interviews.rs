//! Interview lifecycle endpoints.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Json, Path, Query},
    http::{header, HeaderMap, StatusCode},
};
use parley_interview::{store, Answer, Interview, NewAnswer};
use parley_types::{InterviewResult, VoiceMetadata, VoiceSessionStatus};
use parley_voice::stt::MAX_STT_INPUT_BYTES;
use serde::{Deserialize, Serialize};

use crate::api::ApiError;
use crate::error::run_blocking;
use crate::stats::{emit, UsageEvent};
use crate::transcription::Transcript;
use crate::AppState;

/// Response body for `GET /api/interviews/{id}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewResponse {
    pub interview: Interview,
    pub answers: Vec<Answer>,
    pub voice_session_status: Option<VoiceSessionStatus>,
}

/// Request body for `POST /api/interviews/{id}/answers`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerRequest {
    #[serde(alias = "question_id")]
    pub question_id: i64,
    #[serde(alias = "text_answer", alias = "text")]
    pub answer: String,
}

/// Query string of `POST /api/interviews/{id}/answers/audio`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioAnswerQuery {
    pub question_id: i64,
    pub duration_seconds: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioAnswerResponse {
    pub answer_id: i64,
    pub audio_ref: String,
    pub transcript: Transcript,
}

/// Optional request body for `POST /api/interviews/{id}/finish`.
#[derive(Debug, Default, Deserialize)]
pub struct FinishRequest {
    #[serde(default)]
    pub result: Option<InterviewResult>,
}

/// Handler for `GET /api/interviews/{id}`.
pub async fn get_interview_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(interview_id): Path<i64>,
) -> Result<Json<InterviewResponse>, ApiError> {
    let response = run_blocking(&state.pool, move |conn| {
        let interview = store::get_interview(conn, interview_id)?;
        let answers = store::list_answers(conn, interview_id)?;
        Ok(InterviewResponse {
            voice_session_status: interview.voice_session_status(),
            interview,
            answers,
        })
    })
    .await?;
    Ok(Json(response))
}

/// Handler for `POST /api/interviews/{id}/start`.
pub async fn start_interview_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(interview_id): Path<i64>,
) -> Result<Json<Interview>, ApiError> {
    let machine = state.machine.clone();
    let interview = run_blocking(&state.pool, move |conn| {
        Ok(machine.start(conn, interview_id)?)
    })
    .await?;
    Ok(Json(interview))
}

/// Handler for `POST /api/interviews/{id}/answers`.
pub async fn submit_answer_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(interview_id): Path<i64>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<(StatusCode, Json<Answer>), ApiError> {
    if payload.answer.trim().is_empty() {
        return Err(ApiError::BadRequest("answer must not be empty".to_string()));
    }

    let question_id = payload.question_id;
    let new_answer = NewAnswer::text(question_id, payload.answer);
    let machine = state.machine.clone();
    let answer = run_blocking(&state.pool, move |conn| {
        Ok(machine.submit_answer(conn, interview_id, &new_answer)?)
    })
    .await?;

    emit(
        state.stats.as_ref(),
        UsageEvent::AnswerRecorded {
            interview_id,
            question_id,
            voice: false,
        },
    );
    Ok((StatusCode::CREATED, Json(answer)))
}

/// Handler for `POST /api/interviews/{id}/answers/audio`.
///
/// The body is the raw audio clip; its MIME type comes from `Content-Type`.
/// The clip is transcribed before anything is stored, and the answer row is
/// written once with both transcripts. A speech-to-text failure leaves the
/// question unanswered, so the upload can be retried.
pub async fn submit_audio_answer_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(interview_id): Path<i64>,
    Query(query): Query<AudioAnswerQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<AudioAnswerResponse>), ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("audio body is empty".to_string()));
    }
    if body.len() > MAX_STT_INPUT_BYTES {
        return Err(ApiError::BadRequest(format!(
            "audio exceeds {MAX_STT_INPUT_BYTES} bytes"
        )));
    }
    if !state.transcription.is_available().await {
        return Err(ApiError::ServiceUnavailable(
            "transcription services are unavailable".to_string(),
        ));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let transcript = state.transcription.transcribe(&body, &content_type).await?;

    let audio_ref = format!("upload:{}", uuid::Uuid::new_v4());
    let question_id = query.question_id;
    let new_answer = NewAnswer {
        question_id,
        text_answer: None,
        audio_ref: Some(audio_ref.clone()),
        raw_transcription: Some(transcript.raw.clone()),
        formatted_transcription: Some(transcript.formatted.clone()),
        metadata: VoiceMetadata {
            duration_seconds: query.duration_seconds,
            ..VoiceMetadata::default()
        },
    };
    let machine = state.machine.clone();
    let answer = run_blocking(&state.pool, move |conn| {
        Ok(machine.submit_answer(conn, interview_id, &new_answer)?)
    })
    .await?;

    emit(
        state.stats.as_ref(),
        UsageEvent::AnswerRecorded {
            interview_id,
            question_id,
            voice: false,
        },
    );
    state
        .transcription
        .transcribed(answer.id, body.len(), &transcript);

    Ok((
        StatusCode::CREATED,
        Json(AudioAnswerResponse {
            answer_id: answer.id,
            audio_ref,
            transcript,
        }),
    ))
}

/// Handler for `POST /api/interviews/{id}/finish`.
///
/// Accepts an empty body or `{"result": "SUCCESSFUL" | "UNSUCCESSFUL" | "ERROR"}`.
pub async fn finish_interview_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(interview_id): Path<i64>,
    body: Bytes,
) -> Result<Json<Interview>, ApiError> {
    let request: FinishRequest = if body.iter().all(u8::is_ascii_whitespace) {
        FinishRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid finish request: {e}")))?
    };

    let machine = state.machine.clone();
    let interview = run_blocking(&state.pool, move |conn| {
        Ok(machine.finish(conn, interview_id, request.result)?)
    })
    .await?;
    Ok(Json(interview))
}
