//! Errors shared by the session orchestrator, the transcription pipeline and
//! the evaluation scheduler.

use parley_db::DbPool;
use parley_interview::InterviewError;
use parley_voice::VoiceError;
use rusqlite::Connection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Interview(#[from] InterviewError),

    /// A request the engine refuses outright: missing configuration, or a
    /// remote service that rejected it with a 4xx.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A remote dependency is down, timing out or failing with 5xx.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("database connection failed: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<VoiceError> for EngineError {
    fn from(err: VoiceError) -> Self {
        match err {
            VoiceError::Rejected { .. } | VoiceError::Config(_) => Self::Validation(err.to_string()),
            VoiceError::Unavailable(_)
            | VoiceError::Timeout(_)
            | VoiceError::Decode(_)
            | VoiceError::Stt(_) => Self::ServiceUnavailable(err.to_string()),
        }
    }
}

/// Runs blocking database work on the blocking thread pool with a pooled
/// connection.
pub async fn run_blocking<T, F>(pool: &DbPool, work: F) -> Result<T, EngineError>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T, EngineError> + Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        work(&mut conn)
    })
    .await
    .map_err(|e| EngineError::Internal(format!("task join error: {e}")))?
}
