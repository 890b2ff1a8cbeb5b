//! Voice session orchestration.
//!
//! Creates and ends remote voice-agent sessions for an interview, and answers
//! the agent's tool calls (`getNextQuestion`, `saveAnswer`, `endInterview`)
//! against the interview state machine.
//!
//! Database work runs on the blocking pool; remote calls run on the async
//! runtime and never hold a connection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parley_db::DbPool;
use parley_interview::{
    store, Answer, Interview, InterviewError, InterviewMachine, NewAnswer, Position,
};
use parley_types::{InterviewResult, InterviewStatus, SaveAnswerParams, VoiceSessionStatus};
use parley_voice::{
    interview_tools, SessionRequest, VoiceAgent, VoiceAgentConfig, VoiceQualityConfig,
    VoiceSettings,
};
use serde::Serialize;

use crate::error::{run_blocking, EngineError};
use crate::stats::{emit, StatsSink, UsageEvent};

/// Spoken by the agent once every question has an answer.
pub const COMPLETION_MESSAGE: &str =
    "Thank you, that was the last question. The interview is now complete.";

/// What the agent should ask next.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NextQuestion {
    Question {
        #[serde(rename = "questionId")]
        question_id: i64,
        text: String,
        /// Zero-based position of the question.
        index: usize,
        total: usize,
    },
    Completed {
        message: String,
    },
}

/// Voice-related view of an interview.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSessionView {
    pub interview_id: i64,
    pub voice_enabled: bool,
    pub status: Option<VoiceSessionStatus>,
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_duration_seconds: Option<i64>,
}

impl From<&Interview> for VoiceSessionView {
    fn from(interview: &Interview) -> Self {
        Self {
            interview_id: interview.id,
            voice_enabled: interview.voice_enabled,
            status: interview.voice_session_status(),
            session_id: interview.voice_session_id.clone(),
            agent_id: interview.voice_agent_id.clone(),
            started_at: interview.voice_started_at,
            finished_at: interview.voice_finished_at,
            total_duration_seconds: interview.voice_total_duration,
        }
    }
}

/// Outcome of the best-effort remote termination.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum RemoteCleanup {
    Terminated,
    /// No remote session id was recorded.
    Skipped,
    /// The remote call failed; the local end was recorded anyway.
    NonCritical(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndedSession {
    pub session: VoiceSessionView,
    pub remote: RemoteCleanup,
}

/// A stored voice answer with any soft quality warnings it raised.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedVoiceAnswer {
    pub answer_id: i64,
    pub question_id: i64,
    pub warnings: Vec<String>,
}

pub struct SessionOrchestrator {
    pool: DbPool,
    machine: InterviewMachine,
    agent: Arc<dyn VoiceAgent>,
    agent_config: VoiceAgentConfig,
    quality: VoiceQualityConfig,
    stats: Arc<dyn StatsSink>,
}

impl SessionOrchestrator {
    pub fn new(
        pool: DbPool,
        machine: InterviewMachine,
        agent: Arc<dyn VoiceAgent>,
        agent_config: VoiceAgentConfig,
        quality: VoiceQualityConfig,
        stats: Arc<dyn StatsSink>,
    ) -> Self {
        Self {
            pool,
            machine,
            agent,
            agent_config,
            quality,
            stats,
        }
    }

    /// Creates a remote voice session and starts the interview.
    ///
    /// # Errors
    ///
    /// `Validation` when the agent is not configured, the position has no
    /// questions, or the agent rejects the request. `InvalidState` unless the
    /// interview is `NOT_STARTED`. `ServiceUnavailable` when the agent cannot
    /// be reached.
    ///
    /// The agent may report the conversation as started before this call
    /// returns; the session is still attached to the now `IN_PROGRESS`
    /// interview.
    pub async fn create_session(&self, interview_id: i64) -> Result<VoiceSessionView, EngineError> {
        if !self.agent_config.is_configured() {
            return Err(EngineError::Validation(
                "voice agent is not configured (api_key and agent_id are required)".to_string(),
            ));
        }

        let (position, question_count) = run_blocking(&self.pool, move |conn| {
            let interview = store::get_interview(conn, interview_id)?;
            if interview.status != InterviewStatus::NotStarted {
                return Err(InterviewError::InvalidState {
                    interview_id,
                    action: "start a voice session for",
                    status: interview.status,
                }
                .into());
            }
            let position = store::get_position(conn, interview.position_id)?;
            let count = store::count_questions(conn, position.id)?;
            Ok((position, count))
        })
        .await?;

        if question_count == 0 {
            return Err(EngineError::Validation(format!(
                "position {} has no questions",
                position.id
            )));
        }

        let request = self.session_request(interview_id, &position, question_count);
        let handle = self.agent.create_session(&request).await?;
        let session_id = handle.session_id.clone();
        let agent_id = handle
            .agent_id
            .clone()
            .unwrap_or_else(|| self.agent_config.agent_id.clone());

        let machine = self.machine.clone();
        let recorded = run_blocking(&self.pool, move |conn| {
            Ok(machine.start_voice_session(
                conn,
                interview_id,
                &session_id,
                &agent_id,
            )?)
        })
        .await;

        let interview = match recorded {
            Ok(interview) => interview,
            Err(e) => {
                // The interview moved on while the remote session was being created.
                if let Err(cleanup) = self.agent.end_session(&handle.session_id).await {
                    tracing::warn!(
                        interview_id,
                        session_id = %handle.session_id,
                        error = %cleanup,
                        "failed to terminate orphaned voice session"
                    );
                }
                return Err(e);
            }
        };

        emit(
            self.stats.as_ref(),
            UsageEvent::VoiceSessionCreated { interview_id },
        );
        tracing::info!(
            interview_id,
            session_id = %handle.session_id,
            questions = question_count,
            "voice session started"
        );
        Ok(VoiceSessionView::from(&interview))
    }

    /// Returns the question at position `answered count`, finishing the
    /// interview as `SUCCESSFUL` once that count reaches the question total.
    ///
    /// Selection is by count, not by which question lacks an answer, so it
    /// relies on questions being listed in a stable order and answered in it.
    pub async fn get_next_question(&self, interview_id: i64) -> Result<NextQuestion, EngineError> {
        let machine = self.machine.clone();
        run_blocking(&self.pool, move |conn| {
            let interview = store::get_interview(conn, interview_id)?;
            let questions = store::list_questions(conn, interview.position_id)?;
            let answered = store::count_answers(conn, interview_id)?;
            let total = questions.len();

            match questions.get(answered) {
                Some(question) => Ok(NextQuestion::Question {
                    question_id: question.id,
                    text: question.text.clone(),
                    index: answered,
                    total,
                }),
                None => {
                    machine.finish_if_in_progress(
                        conn,
                        interview_id,
                        Some(InterviewResult::Successful),
                    )?;
                    Ok(NextQuestion::Completed {
                        message: COMPLETION_MESSAGE.to_string(),
                    })
                }
            }
        })
        .await
    }

    /// Stores an answer reported by the agent.
    ///
    /// The agent's transcript is already speech-to-text output, so it fills
    /// the raw and formatted transcription columns as well as the text.
    ///
    /// Answers longer than `max_answer_duration_secs` or less confident than
    /// `min_confidence` are stored anyway and reported as warnings.
    pub async fn save_voice_answer(
        &self,
        interview_id: i64,
        params: SaveAnswerParams,
    ) -> Result<SavedVoiceAnswer, EngineError> {
        let warnings = self.quality_warnings(&params);
        for warning in &warnings {
            tracing::warn!(
                interview_id,
                question_id = params.question_id,
                warning = %warning,
                "voice answer quality"
            );
        }

        let question_id = params.question_id;
        let answer = NewAnswer {
            question_id,
            text_answer: Some(params.transcript.clone()),
            audio_ref: None,
            raw_transcription: Some(params.transcript.clone()),
            formatted_transcription: Some(params.transcript),
            metadata: params.metadata,
        };
        let machine = self.machine.clone();
        let stored: Answer = run_blocking(&self.pool, move |conn| {
            Ok(machine.submit_answer(conn, interview_id, &answer)?)
        })
        .await?;

        emit(
            self.stats.as_ref(),
            UsageEvent::AnswerRecorded {
                interview_id,
                question_id,
                voice: true,
            },
        );
        Ok(SavedVoiceAnswer {
            answer_id: stored.id,
            question_id,
            warnings,
        })
    }

    /// Ends the voice session.
    ///
    /// Remote termination is best effort: a failure is logged and reported as
    /// [`RemoteCleanup::NonCritical`]. The local end time and duration are
    /// always recorded.
    ///
    /// # Errors
    ///
    /// `Validation` when voice was never enabled for the interview.
    pub async fn end_session(&self, interview_id: i64) -> Result<EndedSession, EngineError> {
        let interview = run_blocking(&self.pool, move |conn| {
            Ok(store::get_interview(conn, interview_id)?)
        })
        .await?;
        if !interview.voice_enabled {
            return Err(InterviewError::Validation(format!(
                "voice is not enabled for interview {interview_id}"
            ))
            .into());
        }

        let remote = match interview.voice_session_id.as_deref() {
            None => RemoteCleanup::Skipped,
            Some(_) if interview.voice_finished_at.is_some() => RemoteCleanup::Skipped,
            Some(session_id) => match self.agent.end_session(session_id).await {
                Ok(()) => RemoteCleanup::Terminated,
                Err(e) => {
                    tracing::warn!(
                        interview_id,
                        session_id,
                        error = %e,
                        "remote voice session termination failed (non-critical)"
                    );
                    RemoteCleanup::NonCritical(e.to_string())
                }
            },
        };

        let machine = self.machine.clone();
        let outcome = run_blocking(&self.pool, move |conn| {
            Ok(machine.record_voice_end(conn, interview_id)?)
        })
        .await?;

        if outcome.changed {
            emit(
                self.stats.as_ref(),
                UsageEvent::VoiceSessionEnded {
                    interview_id,
                    duration_seconds: outcome.interview.voice_total_duration,
                },
            );
        }
        Ok(EndedSession {
            session: VoiceSessionView::from(&outcome.interview),
            remote,
        })
    }

    /// Handles the agent's `endInterview` tool: ends the voice session and
    /// finishes an in-progress interview, leaving the verdict to evaluation.
    pub async fn end_interview(&self, interview_id: i64) -> Result<VoiceSessionView, EngineError> {
        let interview = run_blocking(&self.pool, move |conn| {
            Ok(store::get_interview(conn, interview_id)?)
        })
        .await?;
        if interview.voice_enabled {
            self.end_session(interview_id).await?;
        }

        let machine = self.machine.clone();
        let outcome = run_blocking(&self.pool, move |conn| {
            Ok(machine.finish_if_in_progress(conn, interview_id, None)?)
        })
        .await?;
        Ok(VoiceSessionView::from(&outcome.interview))
    }

    pub async fn session_status(&self, interview_id: i64) -> Result<VoiceSessionView, EngineError> {
        let interview = run_blocking(&self.pool, move |conn| {
            Ok(store::get_interview(conn, interview_id)?)
        })
        .await?;
        Ok(VoiceSessionView::from(&interview))
    }

    fn session_request(
        &self,
        interview_id: i64,
        position: &Position,
        question_count: usize,
    ) -> SessionRequest {
        let profile = self.quality.voice_profile(&self.agent_config);
        SessionRequest {
            agent_id: self.agent_config.agent_id.clone(),
            interview_id,
            prompt: interview_prompt(position, question_count, &profile.language),
            first_message: format!(
                "Hello! Thank you for joining the interview for the {} position.",
                position.title
            ),
            language: profile.language.clone(),
            voice: VoiceSettings::from(&profile),
            max_duration_seconds: self.quality.max_session_seconds(),
            response_timeout_seconds: self.quality.response_timeout_secs,
            tools: interview_tools(&self.agent_config.webhook_url),
        }
    }

    fn quality_warnings(&self, params: &SaveAnswerParams) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(duration) = params.metadata.duration_seconds {
            if duration > self.quality.max_answer_duration_secs {
                warnings.push(format!(
                    "answer lasted {duration:.1}s, above the {:.1}s limit",
                    self.quality.max_answer_duration_secs
                ));
            }
        }
        if let Some(confidence) = params.metadata.confidence {
            if confidence < self.quality.min_confidence {
                warnings.push(format!(
                    "recognition confidence {confidence:.2} is below {:.2}",
                    self.quality.min_confidence
                ));
            }
        }
        warnings
    }
}

/// System prompt for the remote interviewer.
pub fn interview_prompt(position: &Position, question_count: usize, language: &str) -> String {
    format!(
        "You are a professional interviewer conducting a job interview for the position \
         \"{title}\" ({level} level). Speak in language \"{language}\".\n\
         The interview has {question_count} questions. Call getNextQuestion to obtain each \
         question and ask it exactly as written, one at a time. After the candidate answers, \
         call saveAnswer with the question id and the candidate's answer transcript. Do not \
         evaluate, correct or hint at answers. When getNextQuestion reports that the interview \
         is completed, thank the candidate and call endInterview.",
        title = position.title,
        level = position.level,
    )
}
