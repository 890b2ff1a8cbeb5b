//! The interview state machine.
//!
//! `NOT_STARTED -> IN_PROGRESS -> FINISHED`, with `FINISHED` terminal. Every
//! transition reads the interview row and writes it back inside one
//! `BEGIN IMMEDIATE` transaction, so two writers racing on the same interview
//! serialize on SQLite's reserved lock instead of both acting on a stale read.
//!
//! The webhook-facing transitions (`mark_*`, `record_*`) are conditional on the
//! current state and report whether they changed anything. Replayed or
//! out-of-order events therefore become no-ops instead of errors.

use std::sync::Arc;

use chrono::Utc;
use parley_types::{CandidateStatus, InterviewResult, InterviewStatus};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};

use crate::error::InterviewError;
use crate::model::{Answer, Interview, NewAnswer};
use crate::scoring::ScoringPolicy;
use crate::store;

/// Receives the coarse candidate outcome once an interview has a verdict.
///
/// Called after the deciding transaction has committed. Failures are logged
/// and never undo or fail the transition.
pub trait CandidateHook: Send + Sync {
    fn interview_decided(
        &self,
        conn: &Connection,
        candidate_id: i64,
        outcome: CandidateStatus,
    ) -> Result<(), InterviewError>;
}

/// Writes the outcome to `candidates.status`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StoreCandidateHook;

impl CandidateHook for StoreCandidateHook {
    fn interview_decided(
        &self,
        conn: &Connection,
        candidate_id: i64,
        outcome: CandidateStatus,
    ) -> Result<(), InterviewError> {
        store::set_candidate_status(conn, candidate_id, outcome)
    }
}

/// Ignores outcomes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCandidateHook;

impl CandidateHook for NoopCandidateHook {
    fn interview_decided(
        &self,
        _conn: &Connection,
        _candidate_id: i64,
        _outcome: CandidateStatus,
    ) -> Result<(), InterviewError> {
        Ok(())
    }
}

/// Result of a conditional transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    /// The interview as stored after the call.
    pub interview: Interview,
    /// `false` when the current state made the transition a no-op.
    pub changed: bool,
}

impl TransitionOutcome {
    fn changed(interview: Interview) -> Self {
        Self {
            interview,
            changed: true,
        }
    }

    fn unchanged(interview: Interview) -> Self {
        Self {
            interview,
            changed: false,
        }
    }
}

/// Drives interviews through their lifecycle.
#[derive(Clone)]
pub struct InterviewMachine {
    policy: ScoringPolicy,
    hook: Arc<dyn CandidateHook>,
}

impl std::fmt::Debug for InterviewMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterviewMachine")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Default for InterviewMachine {
    fn default() -> Self {
        Self::new(ScoringPolicy::default())
    }
}

impl InterviewMachine {
    /// A machine that writes candidate outcomes to the candidates table.
    pub fn new(policy: ScoringPolicy) -> Self {
        Self {
            policy,
            hook: Arc::new(StoreCandidateHook),
        }
    }

    /// Replaces the candidate outcome hook.
    pub fn with_hook(mut self, hook: Arc<dyn CandidateHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// `NOT_STARTED -> IN_PROGRESS`.
    ///
    /// # Errors
    ///
    /// `InvalidState` from any other state, `NotFound` for an unknown id.
    pub fn start(
        &self,
        conn: &mut Connection,
        interview_id: i64,
    ) -> Result<Interview, InterviewError> {
        let tx = immediate(conn)?;
        let interview = store::get_interview(&tx, interview_id)?;
        if interview.status != InterviewStatus::NotStarted {
            return Err(InterviewError::InvalidState {
                interview_id,
                action: "start",
                status: interview.status,
            });
        }

        tx.execute(
            "UPDATE interviews SET status = ?1, started_at = ?2 WHERE id = ?3",
            params![
                InterviewStatus::InProgress.label(),
                store::timestamp(Utc::now()),
                interview_id
            ],
        )?;
        let interview = store::get_interview(&tx, interview_id)?;
        tx.commit()?;

        tracing::info!(interview_id, "interview started");
        Ok(interview)
    }

    /// Appends an answer.
    ///
    /// The existence check and the insert share one immediate transaction, so
    /// concurrent submissions for the same question store exactly one row.
    ///
    /// # Errors
    ///
    /// `InvalidState` once the interview is finished, `Validation` when the
    /// question is not part of the interview's position, `AlreadyAnswered`
    /// when the question already has an answer.
    pub fn submit_answer(
        &self,
        conn: &mut Connection,
        interview_id: i64,
        answer: &NewAnswer,
    ) -> Result<Answer, InterviewError> {
        let tx = immediate(conn)?;
        let interview = store::get_interview(&tx, interview_id)?;
        if interview.status == InterviewStatus::Finished {
            return Err(InterviewError::InvalidState {
                interview_id,
                action: "answer",
                status: interview.status,
            });
        }

        let belongs = match store::get_question(&tx, answer.question_id) {
            Ok(question) => question.position_id == interview.position_id,
            Err(InterviewError::NotFound { .. }) => false,
            Err(e) => return Err(e),
        };
        if !belongs {
            return Err(InterviewError::Validation(format!(
                "question {} does not belong to position {}",
                answer.question_id, interview.position_id
            )));
        }

        if store::find_answer(&tx, interview_id, answer.question_id)?.is_some() {
            return Err(InterviewError::AlreadyAnswered {
                interview_id,
                question_id: answer.question_id,
            });
        }

        let answer_id = store::insert_answer(&tx, interview_id, answer)?;
        let stored = store::get_answer(&tx, answer_id)?;
        tx.commit()?;

        tracing::info!(
            interview_id,
            question_id = answer.question_id,
            answer_id,
            "answer recorded"
        );
        Ok(stored)
    }

    /// `IN_PROGRESS -> FINISHED`.
    ///
    /// With zero answers the result is forced to `ERROR`. An explicit result is
    /// used as given. Otherwise the verdict is computed from the answer scores
    /// when every answer is scored; if any answer is still unscored the result
    /// stays unset and the evaluation scheduler decides it later.
    pub fn finish(
        &self,
        conn: &mut Connection,
        interview_id: i64,
        result: Option<InterviewResult>,
    ) -> Result<Interview, InterviewError> {
        let tx = immediate(conn)?;
        let interview = store::get_interview(&tx, interview_id)?;
        if interview.status != InterviewStatus::InProgress {
            return Err(InterviewError::InvalidState {
                interview_id,
                action: "finish",
                status: interview.status,
            });
        }

        let finished = self.write_finish(tx, &interview, result)?;
        self.notify(conn, &finished);
        Ok(finished)
    }

    /// Like [`finish`](Self::finish), but a no-op unless the interview is
    /// `IN_PROGRESS`. Duplicate end-of-interview calls land here.
    pub fn finish_if_in_progress(
        &self,
        conn: &mut Connection,
        interview_id: i64,
        result: Option<InterviewResult>,
    ) -> Result<TransitionOutcome, InterviewError> {
        let tx = immediate(conn)?;
        let interview = store::get_interview(&tx, interview_id)?;
        if interview.status != InterviewStatus::InProgress {
            tracing::debug!(
                interview_id,
                status = %interview.status,
                "finish ignored"
            );
            return Ok(TransitionOutcome::unchanged(interview));
        }

        let finished = self.write_finish(tx, &interview, result)?;
        self.notify(conn, &finished);
        Ok(TransitionOutcome::changed(finished))
    }

    /// Writes `FINISHED` and the result for an interview read inside `tx`.
    fn write_finish(
        &self,
        tx: Transaction<'_>,
        interview: &Interview,
        result: Option<InterviewResult>,
    ) -> Result<Interview, InterviewError> {
        let interview_id = interview.id;
        let answers = store::list_answers(&tx, interview_id)?;
        let (result, ai_score) = if answers.is_empty() {
            (Some(InterviewResult::Error), None)
        } else if result.is_some() {
            (result, None)
        } else {
            self.verdict_from_scores(&tx, interview, &answers)?
        };

        tx.execute(
            "UPDATE interviews
             SET status = ?1, finished_at = ?2, result = ?3, ai_score = COALESCE(?4, ai_score)
             WHERE id = ?5",
            params![
                InterviewStatus::Finished.label(),
                store::timestamp(Utc::now()),
                result.map(|r| r.label()),
                ai_score,
                interview_id
            ],
        )?;
        let finished = store::get_interview(&tx, interview_id)?;
        tx.commit()?;

        tracing::info!(
            interview_id,
            answers = answers.len(),
            result = finished.result.map(|r| r.label()),
            "interview finished"
        );
        Ok(finished)
    }

    /// `NOT_STARTED -> IN_PROGRESS`; a no-op in any other state.
    pub fn mark_conversation_started(
        &self,
        conn: &mut Connection,
        interview_id: i64,
    ) -> Result<TransitionOutcome, InterviewError> {
        let tx = immediate(conn)?;
        let interview = store::get_interview(&tx, interview_id)?;
        if interview.status != InterviewStatus::NotStarted {
            tracing::debug!(
                interview_id,
                status = %interview.status,
                "conversation start ignored"
            );
            return Ok(TransitionOutcome::unchanged(interview));
        }

        tx.execute(
            "UPDATE interviews SET status = ?1, started_at = COALESCE(started_at, ?2) WHERE id = ?3",
            params![
                InterviewStatus::InProgress.label(),
                store::timestamp(Utc::now()),
                interview_id
            ],
        )?;
        let interview = store::get_interview(&tx, interview_id)?;
        tx.commit()?;

        tracing::info!(interview_id, "conversation started");
        Ok(TransitionOutcome::changed(interview))
    }

    /// `NOT_STARTED | IN_PROGRESS -> FINISHED` without a result.
    ///
    /// The verdict is left to the evaluation scheduler. Already finished
    /// interviews are left untouched.
    pub fn mark_conversation_ended(
        &self,
        conn: &mut Connection,
        interview_id: i64,
    ) -> Result<TransitionOutcome, InterviewError> {
        let tx = immediate(conn)?;
        let interview = store::get_interview(&tx, interview_id)?;
        if interview.status == InterviewStatus::Finished {
            tracing::debug!(interview_id, "conversation end ignored, already finished");
            return Ok(TransitionOutcome::unchanged(interview));
        }

        tx.execute(
            "UPDATE interviews SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![
                InterviewStatus::Finished.label(),
                store::timestamp(Utc::now()),
                interview_id
            ],
        )?;
        let interview = store::get_interview(&tx, interview_id)?;
        tx.commit()?;

        tracing::info!(
            interview_id,
            "conversation ended, interview awaiting evaluation"
        );
        Ok(TransitionOutcome::changed(interview))
    }

    /// Moves the interview to `FINISHED` with result `ERROR`.
    ///
    /// A finished interview without a result receives `ERROR`; one that
    /// already has a result is left alone.
    pub fn mark_failed(
        &self,
        conn: &mut Connection,
        interview_id: i64,
    ) -> Result<TransitionOutcome, InterviewError> {
        let tx = immediate(conn)?;
        let interview = store::get_interview(&tx, interview_id)?;
        if interview.result.is_some() {
            return Ok(TransitionOutcome::unchanged(interview));
        }

        tx.execute(
            "UPDATE interviews
             SET status = ?1, result = ?2, finished_at = COALESCE(finished_at, ?3)
             WHERE id = ?4",
            params![
                InterviewStatus::Finished.label(),
                InterviewResult::Error.label(),
                store::timestamp(Utc::now()),
                interview_id
            ],
        )?;
        let interview = store::get_interview(&tx, interview_id)?;
        tx.commit()?;

        tracing::warn!(interview_id, "interview marked as failed");
        self.notify(conn, &interview);
        Ok(TransitionOutcome::changed(interview))
    }

    /// Attaches a remote voice session and starts the interview.
    ///
    /// `NOT_STARTED` interviews move to `IN_PROGRESS`. An interview the
    /// conversation-started webhook already moved to `IN_PROGRESS` keeps its
    /// state and only gains the session, as long as none is attached yet.
    ///
    /// # Errors
    ///
    /// `InvalidState` when the interview is finished or already carries a
    /// voice session.
    pub fn start_voice_session(
        &self,
        conn: &mut Connection,
        interview_id: i64,
        session_id: &str,
        agent_id: &str,
    ) -> Result<Interview, InterviewError> {
        let tx = immediate(conn)?;
        let interview = store::get_interview(&tx, interview_id)?;
        let attachable = match interview.status {
            InterviewStatus::NotStarted => true,
            InterviewStatus::InProgress => interview.voice_session_id.is_none(),
            InterviewStatus::Finished => false,
        };
        if !attachable {
            return Err(InterviewError::InvalidState {
                interview_id,
                action: "attach a voice session to",
                status: interview.status,
            });
        }

        let now = store::timestamp(Utc::now());
        tx.execute(
            "UPDATE interviews
             SET status = ?1, started_at = COALESCE(started_at, ?2),
                 voice_enabled = 1, voice_session_id = ?3, voice_agent_id = ?4,
                 voice_started_at = ?2, voice_finished_at = NULL, voice_total_duration = NULL
             WHERE id = ?5",
            params![
                InterviewStatus::InProgress.label(),
                now,
                session_id,
                agent_id,
                interview_id
            ],
        )?;
        let started = store::get_interview(&tx, interview_id)?;
        tx.commit()?;

        tracing::info!(
            interview_id,
            session_id,
            already_started = interview.status == InterviewStatus::InProgress,
            "voice session attached, interview started"
        );
        Ok(started)
    }

    /// Records the end of the voice session and its wall-clock duration.
    ///
    /// The first recorded end wins; later calls report `changed: false`.
    ///
    /// # Errors
    ///
    /// `Validation` when voice was never enabled for the interview.
    pub fn record_voice_end(
        &self,
        conn: &mut Connection,
        interview_id: i64,
    ) -> Result<TransitionOutcome, InterviewError> {
        let tx = immediate(conn)?;
        let interview = store::get_interview(&tx, interview_id)?;
        if !interview.voice_enabled {
            return Err(InterviewError::Validation(format!(
                "voice is not enabled for interview {interview_id}"
            )));
        }
        if interview.voice_finished_at.is_some() {
            return Ok(TransitionOutcome::unchanged(interview));
        }

        let now = Utc::now();
        let duration = interview
            .voice_started_at
            .map(|started| (now - started).num_seconds().max(0));
        tx.execute(
            "UPDATE interviews SET voice_finished_at = ?1, voice_total_duration = ?2 WHERE id = ?3",
            params![store::timestamp(now), duration, interview_id],
        )?;
        let interview = store::get_interview(&tx, interview_id)?;
        tx.commit()?;

        tracing::info!(
            interview_id,
            duration_seconds = duration,
            "voice session end recorded"
        );
        Ok(TransitionOutcome::changed(interview))
    }

    /// Stores the scheduler's verdict on a finished interview awaiting one.
    ///
    /// Any other state is a no-op, so an evaluation racing with `mark_failed`
    /// or a second scheduler pass cannot overwrite a decided result.
    pub fn record_evaluation(
        &self,
        conn: &mut Connection,
        interview_id: i64,
        ai_score: Option<f64>,
        result: InterviewResult,
    ) -> Result<TransitionOutcome, InterviewError> {
        let tx = immediate(conn)?;
        let interview = store::get_interview(&tx, interview_id)?;
        if !interview.awaiting_evaluation() {
            return Ok(TransitionOutcome::unchanged(interview));
        }

        tx.execute(
            "UPDATE interviews SET result = ?1, ai_score = ?2 WHERE id = ?3",
            params![result.label(), ai_score, interview_id],
        )?;
        let interview = store::get_interview(&tx, interview_id)?;
        tx.commit()?;

        tracing::info!(
            interview_id,
            ai_score,
            result = %result,
            "interview evaluated"
        );
        self.notify(conn, &interview);
        Ok(TransitionOutcome::changed(interview))
    }

    /// Verdict for `finish` when no explicit result was passed.
    fn verdict_from_scores(
        &self,
        conn: &Connection,
        interview: &Interview,
        answers: &[Answer],
    ) -> Result<(Option<InterviewResult>, Option<f64>), InterviewError> {
        let scores: Option<Vec<f64>> = answers.iter().map(|a| a.score).collect();
        let Some(scores) = scores else {
            return Ok((None, None));
        };

        let position = store::get_position(conn, interview.position_id)?;
        let threshold = self.policy.threshold_for(&position);
        Ok(match self.policy.decide(scores, threshold) {
            Some(verdict) => (Some(verdict.result), Some(verdict.average)),
            None => (Some(InterviewResult::Error), None),
        })
    }

    fn notify(&self, conn: &Connection, interview: &Interview) {
        let Some(outcome) = interview.result.and_then(|r| r.candidate_outcome()) else {
            return;
        };
        if let Err(e) = self
            .hook
            .interview_decided(conn, interview.candidate_id, outcome)
        {
            tracing::warn!(
                interview_id = interview.id,
                candidate_id = interview.candidate_id,
                error = %e,
                "candidate outcome hook failed"
            );
        }
    }
}

fn immediate(conn: &mut Connection) -> rusqlite::Result<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
}
