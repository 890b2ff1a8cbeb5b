//! Periodic evaluation of finished interviews.
//!
//! Each pass picks up every `FINISHED` interview without a result, grades its
//! unscored answers with the text-generation oracle and records the verdict.
//! A failing oracle leaves that interview for the next pass; the rest of the
//! batch still runs.

use std::sync::Arc;

use parley_db::DbPool;
use parley_interview::scoring::{normalize_rubric_score, parse_rubric_score};
use parley_interview::{store, Answer, InterviewMachine, Position};
use parley_types::InterviewResult;
use parley_voice::TextGenerator;
use serde::Serialize;
use tokio::time::{sleep, Duration};

use crate::error::{run_blocking, EngineError};
use crate::stats::{emit, StatsSink, UsageEvent};

/// System instruction for the rubric prompt.
pub const RUBRIC_INSTRUCTION: &str = "You are an impartial technical interviewer grading one \
answer. Reply with a single integer from 1 (poor) to 10 (excellent) and nothing else.";

const UNPARSABLE_FEEDBACK: &str = "evaluation reply could not be parsed";

/// Feedback is kept short; the full reply is not needed for the verdict.
const MAX_FEEDBACK_CHARS: usize = 500;

/// Outcome counts of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationReport {
    /// Interviews that received a result.
    pub evaluated: usize,
    /// Interviews left unevaluated because an oracle or storage call failed.
    pub failed: usize,
    /// Interviews someone else decided while this pass was grading them.
    pub skipped: usize,
}

struct Pending {
    position: Position,
    answers: Vec<(Answer, String)>,
}

pub struct Evaluator {
    pool: DbPool,
    machine: InterviewMachine,
    llm: Arc<dyn TextGenerator>,
    stats: Arc<dyn StatsSink>,
}

impl Evaluator {
    pub fn new(
        pool: DbPool,
        machine: InterviewMachine,
        llm: Arc<dyn TextGenerator>,
        stats: Arc<dyn StatsSink>,
    ) -> Self {
        Self {
            pool,
            machine,
            llm,
            stats,
        }
    }

    /// Evaluates every interview awaiting a verdict.
    ///
    /// # Errors
    ///
    /// Only when the pending list itself cannot be loaded; per-interview
    /// failures are counted in the report.
    pub async fn run_evaluation_pass(&self) -> Result<EvaluationReport, EngineError> {
        let pending = run_blocking(&self.pool, |conn| Ok(store::list_pending_evaluation(conn)?)).await?;
        let mut report = EvaluationReport::default();

        for interview in pending {
            match self.evaluate(interview.id).await {
                Ok(true) => report.evaluated += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(
                        interview_id = interview.id,
                        error = %e,
                        "evaluation failed, will retry next pass"
                    );
                    report.failed += 1;
                }
            }
        }

        if report != EvaluationReport::default() {
            tracing::info!(
                evaluated = report.evaluated,
                failed = report.failed,
                skipped = report.skipped,
                "evaluation pass complete"
            );
        }
        Ok(report)
    }

    /// Grades one interview. `Ok(false)` when it no longer awaited a verdict.
    async fn evaluate(&self, interview_id: i64) -> Result<bool, EngineError> {
        let pending = run_blocking(&self.pool, move |conn| {
            let interview = store::get_interview(conn, interview_id)?;
            let position = store::get_position(conn, interview.position_id)?;
            let mut answers = Vec::new();
            for answer in store::list_answers(conn, interview_id)? {
                let question = store::get_question(conn, answer.question_id)?;
                answers.push((answer, question.text));
            }
            Ok(Pending { position, answers })
        })
        .await?;

        if pending.answers.is_empty() {
            tracing::info!(interview_id, "no answers recorded, marking interview as error");
            return self.record(interview_id, None, InterviewResult::Error).await;
        }

        let mut scores = Vec::with_capacity(pending.answers.len());
        for (answer, question) in &pending.answers {
            let score = match answer.score {
                Some(score) => score,
                None => self.grade(&pending.position, question, answer).await?,
            };
            scores.push(score);
        }

        let threshold = self.machine.policy().threshold_for(&pending.position);
        match self.machine.policy().decide(scores, threshold) {
            Some(verdict) => {
                self.record(interview_id, Some(verdict.average), verdict.result)
                    .await
            }
            None => {
                tracing::warn!(interview_id, "no gradeable answers, marking interview as error");
                self.record(interview_id, None, InterviewResult::Error).await
            }
        }
    }

    /// Grades and stores one answer, returning the stored 0-100 score.
    async fn grade(
        &self,
        position: &Position,
        question: &str,
        answer: &Answer,
    ) -> Result<f64, EngineError> {
        let content = answer.content().trim();
        let (score, feedback) = if content.is_empty() {
            (normalize_rubric_score(1), "empty answer".to_string())
        } else {
            let prompt = rubric_prompt(position, question, content);
            let reply = self.llm.generate(&prompt, Some(RUBRIC_INSTRUCTION)).await?;
            match parse_rubric_score(&reply) {
                Some(rubric) => (normalize_rubric_score(rubric), truncate(reply.trim())),
                None => {
                    tracing::warn!(
                        answer_id = answer.id,
                        reply = %truncate(reply.trim()),
                        "unparsable evaluation reply"
                    );
                    (0.0, UNPARSABLE_FEEDBACK.to_string())
                }
            }
        };

        let answer_id = answer.id;
        run_blocking(&self.pool, move |conn| {
            Ok(store::set_answer_score(conn, answer_id, score, Some(&feedback))?)
        })
        .await?;
        tracing::debug!(answer_id, score, "answer graded");
        Ok(score)
    }

    async fn record(
        &self,
        interview_id: i64,
        ai_score: Option<f64>,
        result: InterviewResult,
    ) -> Result<bool, EngineError> {
        let machine = self.machine.clone();
        let outcome = run_blocking(&self.pool, move |conn| {
            Ok(machine.record_evaluation(conn, interview_id, ai_score, result)?)
        })
        .await?;
        if outcome.changed {
            emit(
                self.stats.as_ref(),
                UsageEvent::InterviewEvaluated {
                    interview_id,
                    result,
                },
            );
        }
        Ok(outcome.changed)
    }
}

/// Rubric prompt for one answer.
pub fn rubric_prompt(position: &Position, question: &str, answer: &str) -> String {
    format!(
        "Position: {title} ({level} level)\n\
         Question: {question}\n\
         Candidate answer: {answer}\n\n\
         Rate the answer from 1 to 10 for correctness, depth and clarity \
         expected at this level.",
        title = position.title,
        level = position.level,
    )
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_FEEDBACK_CHARS).collect()
}

/// Starts the evaluation scheduler.
///
/// Runs indefinitely, one pass every `interval_seconds`. An interval of 0
/// disables the scheduler.
pub async fn start_evaluation_task(evaluator: Arc<Evaluator>, interval_seconds: u64) {
    if interval_seconds == 0 {
        tracing::warn!("evaluation scheduler disabled (interval_seconds=0)");
        return;
    }

    let interval = Duration::from_secs(interval_seconds);
    tracing::info!(interval_seconds, "starting evaluation scheduler");

    loop {
        sleep(interval).await;

        if let Err(e) = evaluator.run_evaluation_pass().await {
            tracing::error!(error = %e, "evaluation pass failed");
        }
    }
}
