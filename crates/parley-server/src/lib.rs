//! Parley server library logic.
//!
//! Wires the interview state machine, the voice session orchestrator, the
//! webhook dispatcher, the transcription pipeline and the evaluation
//! scheduler behind an axum router.

pub mod api;
pub mod api_interviews;
pub mod api_voice;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod session;
pub mod stats;
pub mod transcription;
pub mod webhook;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use parley_db::DbPool;
use parley_interview::{InterviewMachine, StoreCandidateHook};
use parley_voice::{
    build_speech_to_text, HttpTextGenerator, HttpVoiceAgent, SpeechToText, TextGenerator,
    VoiceAgent, VoiceError,
};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::evaluation::Evaluator;
use crate::session::SessionOrchestrator;
use crate::stats::{StatsSink, TracingStats};
use crate::transcription::TranscriptionPipeline;
use crate::webhook::{WebhookDispatcher, WebhookVerifier};

pub use error::EngineError;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    pub machine: InterviewMachine,
    pub sessions: Arc<SessionOrchestrator>,
    pub webhooks: Arc<WebhookDispatcher>,
    pub transcription: Arc<TranscriptionPipeline>,
    pub evaluator: Arc<Evaluator>,
    pub stats: Arc<dyn StatsSink>,
}

/// The remote collaborators the engine talks to.
#[derive(Clone)]
pub struct Oracles {
    pub agent: Arc<dyn VoiceAgent>,
    pub stt: Arc<dyn SpeechToText>,
    pub llm: Arc<dyn TextGenerator>,
}

impl Oracles {
    /// HTTP (or local binary) clients built from the configuration.
    pub fn from_config(config: &Config) -> Result<Self, VoiceError> {
        Ok(Self {
            agent: Arc::new(HttpVoiceAgent::new(&config.voice_agent)?),
            stt: build_speech_to_text(&config.stt)?,
            llm: Arc::new(HttpTextGenerator::new(&config.llm)?),
        })
    }
}

/// Assembles the engine components around one pool.
pub fn build_state(
    config: &Config,
    pool: DbPool,
    oracles: Oracles,
    stats: Arc<dyn StatsSink>,
) -> AppState {
    let machine = InterviewMachine::new(config.evaluation.scoring_policy())
        .with_hook(Arc::new(StoreCandidateHook));

    let sessions = Arc::new(SessionOrchestrator::new(
        pool.clone(),
        machine.clone(),
        oracles.agent,
        config.voice_agent.clone(),
        config.voice_quality.clone(),
        stats.clone(),
    ));
    let webhooks = Arc::new(WebhookDispatcher::new(
        pool.clone(),
        machine.clone(),
        sessions.clone(),
        WebhookVerifier::new(config.webhook.validate_signature, &config.webhook.secret),
        stats.clone(),
    ));
    let transcription = Arc::new(TranscriptionPipeline::new(
        pool.clone(),
        oracles.stt,
        oracles.llm.clone(),
        stats.clone(),
    ));
    let evaluator = Arc::new(Evaluator::new(
        pool.clone(),
        machine.clone(),
        oracles.llm,
        stats.clone(),
    ));

    AppState {
        pool,
        machine,
        sessions,
        webhooks,
        transcription,
        evaluator,
        stats,
    }
}

/// Same as [`build_state`] with statistics written to the log.
pub fn build_default_state(config: &Config, pool: DbPool, oracles: Oracles) -> AppState {
    build_state(config, pool, oracles, Arc::new(TracingStats))
}

/// Maximum request body size (2 MiB) outside the audio upload route.
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Audio uploads may be as large as the speech-to-text input limit.
const MAX_AUDIO_BODY_BYTES: usize = parley_voice::stt::MAX_STT_INPUT_BYTES + 64 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let audio_routes = Router::new()
        .route(
            "/api/interviews/{id}/answers/audio",
            post(api_interviews::submit_audio_answer_handler),
        )
        .layer(DefaultBodyLimit::max(MAX_AUDIO_BODY_BYTES));

    let routes = Router::new()
        .route("/health", get(health))
        .route(
            "/api/interviews/{id}",
            get(api_interviews::get_interview_handler),
        )
        .route(
            "/api/interviews/{id}/start",
            post(api_interviews::start_interview_handler),
        )
        .route(
            "/api/interviews/{id}/answers",
            post(api_interviews::submit_answer_handler),
        )
        .route(
            "/api/interviews/{id}/finish",
            post(api_interviews::finish_interview_handler),
        )
        .route(
            "/api/interviews/{id}/voice/session",
            post(api_voice::create_session_handler).delete(api_voice::end_session_handler),
        )
        .route(
            "/api/interviews/{id}/voice/status",
            get(api_voice::session_status_handler),
        )
        .route(
            "/api/interviews/{id}/voice/next-question",
            get(api_voice::next_question_handler),
        )
        .route("/api/webhooks/voice", post(api_voice::voice_webhook_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES));

    routes
        .merge(audio_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
