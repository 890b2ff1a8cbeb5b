//! Error types for interview operations.

use parley_types::InterviewStatus;

/// Errors raised by the answer store and the interview state machine.
#[derive(Debug, thiserror::Error)]
pub enum InterviewError {
    /// Bad input or an unmet precondition (foreign question, missing voice session).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An answer for this (interview, question) pair is already stored.
    #[error("validation failed: question {question_id} already answered in interview {interview_id}")]
    AlreadyAnswered { interview_id: i64, question_id: i64 },

    /// The transition is not allowed from the interview's current state.
    #[error("cannot {action} interview {interview_id} in state {status}")]
    InvalidState {
        interview_id: i64,
        action: &'static str,
        status: InterviewStatus,
    },

    /// An id did not resolve to a row.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    /// A database operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl InterviewError {
    /// Returns `true` for errors the caller should surface as a rejected request.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::AlreadyAnswered { .. })
    }
}
