//! Row types for interviews, answers and the collaborator entities they
//! reference by id.

use chrono::{DateTime, Utc};
use parley_types::{
    CandidateStatus, InterviewResult, InterviewStatus, VoiceMetadata, VoiceSessionStatus,
};
use serde::{Deserialize, Serialize};

/// An interview row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interview {
    pub id: i64,
    pub candidate_id: i64,
    pub position_id: i64,
    pub status: InterviewStatus,
    pub result: Option<InterviewResult>,
    /// Average answer score on the 0-100 scale, written by evaluation.
    pub ai_score: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub voice_enabled: bool,
    pub voice_session_id: Option<String>,
    pub voice_agent_id: Option<String>,
    pub voice_started_at: Option<DateTime<Utc>>,
    pub voice_finished_at: Option<DateTime<Utc>>,
    /// Wall-clock length of the voice session in seconds.
    pub voice_total_duration: Option<i64>,
    pub created_at: String,
}

impl Interview {
    /// Derived voice session status; `None` when voice was never enabled.
    pub fn voice_session_status(&self) -> Option<VoiceSessionStatus> {
        VoiceSessionStatus::derive(self.voice_enabled, self.status, self.result)
    }

    /// Finished but not yet given a verdict by the evaluation scheduler.
    pub fn awaiting_evaluation(&self) -> bool {
        self.status == InterviewStatus::Finished && self.result.is_none()
    }
}

/// A stored answer to one question of one interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub id: i64,
    pub interview_id: i64,
    pub question_id: i64,
    pub text_answer: Option<String>,
    pub audio_ref: Option<String>,
    /// Verbatim oracle output, kept for offline analysis only.
    pub raw_transcription: Option<String>,
    /// User-facing transcript.
    pub formatted_transcription: Option<String>,
    /// 0-100. A score of 0 marks an answer the evaluator could not grade.
    pub score: Option<f64>,
    pub feedback: Option<String>,
    pub duration_seconds: Option<f64>,
    pub confidence: Option<f64>,
    pub speaker_id: Option<String>,
    pub emotion: Option<String>,
    pub created_at: String,
}

impl Answer {
    /// The best available text of the answer, preferring the formatted
    /// transcript, then typed text, then the raw transcript.
    pub fn content(&self) -> &str {
        self.formatted_transcription
            .as_deref()
            .or(self.text_answer.as_deref())
            .or(self.raw_transcription.as_deref())
            .unwrap_or("")
    }
}

/// Input for [`crate::InterviewMachine::submit_answer`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewAnswer {
    pub question_id: i64,
    pub text_answer: Option<String>,
    pub audio_ref: Option<String>,
    pub raw_transcription: Option<String>,
    pub formatted_transcription: Option<String>,
    pub metadata: VoiceMetadata,
}

impl NewAnswer {
    /// A typed text answer.
    pub fn text(question_id: i64, text: impl Into<String>) -> Self {
        Self {
            question_id,
            text_answer: Some(text.into()),
            ..Self::default()
        }
    }
}

/// A job position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: i64,
    pub title: String,
    pub level: String,
    /// Position-specific pass threshold on the 0-100 scale.
    pub min_score: Option<f64>,
}

/// One question of a position, in position order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub position_id: i64,
    pub text: String,
    pub sort_order: i64,
}

/// A candidate being interviewed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub status: CandidateStatus,
}
