//! Answer store and id-based lookups.
//!
//! Every function takes a plain `&Connection` and runs a single statement (or
//! a read), so callers decide the transaction boundary. The state machine wraps
//! the ones that mutate an interview in an immediate transaction.
//!
//! Related entities are always fetched by id; nothing here hands out a graph of
//! owned references between interviews, positions and answers.

use crate::error::InterviewError;
use crate::model::{Answer, Candidate, Interview, NewAnswer, Position, Question};
use chrono::{DateTime, SecondsFormat, Utc};
use parley_types::{CandidateStatus, InterviewStatus, ParseLabelError};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::str::FromStr;

const INTERVIEW_COLUMNS: &str = "id, candidate_id, position_id, status, result, ai_score,
    started_at, finished_at, voice_enabled, voice_session_id, voice_agent_id,
    voice_started_at, voice_finished_at, voice_total_duration, created_at";

const ANSWER_COLUMNS: &str = "id, interview_id, question_id, text_answer, audio_ref,
    raw_transcription, formatted_transcription, score, feedback, duration_seconds,
    confidence, speaker_id, emotion, created_at";

/// Formats a timestamp the way every `*_at` column stores it.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ---------------------------------------------------------------------------
// Collaborator entities
// ---------------------------------------------------------------------------

/// Creates a position and returns its id.
pub fn create_position(
    conn: &Connection,
    title: &str,
    level: &str,
    min_score: Option<f64>,
) -> Result<i64, InterviewError> {
    conn.execute(
        "INSERT INTO positions (title, level, min_score) VALUES (?1, ?2, ?3)",
        params![title, level, min_score],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Appends a question to a position's question set.
pub fn add_question(
    conn: &Connection,
    position_id: i64,
    text: &str,
    sort_order: i64,
) -> Result<i64, InterviewError> {
    conn.execute(
        "INSERT INTO questions (position_id, text, sort_order) VALUES (?1, ?2, ?3)",
        params![position_id, text, sort_order],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Creates a candidate in the `NEW` state.
pub fn create_candidate(
    conn: &Connection,
    name: &str,
    email: Option<&str>,
) -> Result<i64, InterviewError> {
    conn.execute(
        "INSERT INTO candidates (name, email) VALUES (?1, ?2)",
        params![name, email],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Converts a candidate into a `NOT_STARTED` interview for a position.
pub fn convert_candidate(
    conn: &Connection,
    candidate_id: i64,
    position_id: i64,
) -> Result<i64, InterviewError> {
    get_candidate(conn, candidate_id)?;
    get_position(conn, position_id)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO interviews (candidate_id, position_id) VALUES (?1, ?2)",
        params![candidate_id, position_id],
    )?;
    let interview_id = tx.last_insert_rowid();
    tx.execute(
        "UPDATE candidates SET status = ?1 WHERE id = ?2",
        params![CandidateStatus::InInterview.label(), candidate_id],
    )?;
    tx.commit()?;

    Ok(interview_id)
}

pub fn get_position(conn: &Connection, position_id: i64) -> Result<Position, InterviewError> {
    conn.query_row(
        "SELECT id, title, level, min_score FROM positions WHERE id = ?1",
        [position_id],
        |row| {
            Ok(Position {
                id: row.get(0)?,
                title: row.get(1)?,
                level: row.get(2)?,
                min_score: row.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or(InterviewError::NotFound {
        entity: "position",
        id: position_id,
    })
}

/// Lists a position's questions in interview order (`sort_order`, then id).
pub fn list_questions(conn: &Connection, position_id: i64) -> Result<Vec<Question>, InterviewError> {
    let mut stmt = conn.prepare(
        "SELECT id, position_id, text, sort_order FROM questions
         WHERE position_id = ?1 ORDER BY sort_order ASC, id ASC",
    )?;
    let rows = stmt.query_map([position_id], |row| {
        Ok(Question {
            id: row.get(0)?,
            position_id: row.get(1)?,
            text: row.get(2)?,
            sort_order: row.get(3)?,
        })
    })?;
    let mut questions = Vec::new();
    for row in rows {
        questions.push(row?);
    }
    Ok(questions)
}

pub fn count_questions(conn: &Connection, position_id: i64) -> Result<usize, InterviewError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM questions WHERE position_id = ?1",
        [position_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

pub fn get_question(conn: &Connection, question_id: i64) -> Result<Question, InterviewError> {
    conn.query_row(
        "SELECT id, position_id, text, sort_order FROM questions WHERE id = ?1",
        [question_id],
        |row| {
            Ok(Question {
                id: row.get(0)?,
                position_id: row.get(1)?,
                text: row.get(2)?,
                sort_order: row.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or(InterviewError::NotFound {
        entity: "question",
        id: question_id,
    })
}

pub fn get_candidate(conn: &Connection, candidate_id: i64) -> Result<Candidate, InterviewError> {
    conn.query_row(
        "SELECT id, name, email, status FROM candidates WHERE id = ?1",
        [candidate_id],
        |row| {
            Ok(Candidate {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                status: parse_label(3, row.get(3)?)?,
            })
        },
    )
    .optional()?
    .ok_or(InterviewError::NotFound {
        entity: "candidate",
        id: candidate_id,
    })
}

pub fn set_candidate_status(
    conn: &Connection,
    candidate_id: i64,
    status: CandidateStatus,
) -> Result<(), InterviewError> {
    let count = conn.execute(
        "UPDATE candidates SET status = ?1 WHERE id = ?2",
        params![status.label(), candidate_id],
    )?;
    if count == 0 {
        return Err(InterviewError::NotFound {
            entity: "candidate",
            id: candidate_id,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Interviews
// ---------------------------------------------------------------------------

pub fn get_interview(conn: &Connection, interview_id: i64) -> Result<Interview, InterviewError> {
    conn.query_row(
        &format!("SELECT {INTERVIEW_COLUMNS} FROM interviews WHERE id = ?1"),
        [interview_id],
        map_row_to_interview,
    )
    .optional()?
    .ok_or(InterviewError::NotFound {
        entity: "interview",
        id: interview_id,
    })
}

/// Finished interviews that have no verdict yet, oldest first.
pub fn list_pending_evaluation(conn: &Connection) -> Result<Vec<Interview>, InterviewError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {INTERVIEW_COLUMNS} FROM interviews
         WHERE status = ?1 AND result IS NULL
         ORDER BY finished_at ASC, id ASC"
    ))?;
    let rows = stmt.query_map([InterviewStatus::Finished.label()], map_row_to_interview)?;
    let mut interviews = Vec::new();
    for row in rows {
        interviews.push(row?);
    }
    Ok(interviews)
}

// ---------------------------------------------------------------------------
// Answers
// ---------------------------------------------------------------------------

/// Answers of an interview in submission order.
pub fn list_answers(conn: &Connection, interview_id: i64) -> Result<Vec<Answer>, InterviewError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ANSWER_COLUMNS} FROM answers WHERE interview_id = ?1 ORDER BY id ASC"
    ))?;
    let rows = stmt.query_map([interview_id], map_row_to_answer)?;
    let mut answers = Vec::new();
    for row in rows {
        answers.push(row?);
    }
    Ok(answers)
}

pub fn count_answers(conn: &Connection, interview_id: i64) -> Result<usize, InterviewError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM answers WHERE interview_id = ?1",
        [interview_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

pub fn get_answer(conn: &Connection, answer_id: i64) -> Result<Answer, InterviewError> {
    conn.query_row(
        &format!("SELECT {ANSWER_COLUMNS} FROM answers WHERE id = ?1"),
        [answer_id],
        map_row_to_answer,
    )
    .optional()?
    .ok_or(InterviewError::NotFound {
        entity: "answer",
        id: answer_id,
    })
}

pub fn find_answer(
    conn: &Connection,
    interview_id: i64,
    question_id: i64,
) -> Result<Option<Answer>, InterviewError> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {ANSWER_COLUMNS} FROM answers WHERE interview_id = ?1 AND question_id = ?2"
            ),
            params![interview_id, question_id],
            map_row_to_answer,
        )
        .optional()?)
}

/// Inserts an answer row.
///
/// The existence check belongs to the caller's transaction; a unique-index
/// violation that slips past it is still reported as
/// [`InterviewError::AlreadyAnswered`].
pub fn insert_answer(
    conn: &Connection,
    interview_id: i64,
    answer: &NewAnswer,
) -> Result<i64, InterviewError> {
    let inserted = conn.execute(
        "INSERT INTO answers (
            interview_id, question_id, text_answer, audio_ref, raw_transcription,
            formatted_transcription, duration_seconds, confidence, speaker_id, emotion
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            interview_id,
            answer.question_id,
            answer.text_answer,
            answer.audio_ref,
            answer.raw_transcription,
            answer.formatted_transcription,
            answer.metadata.duration_seconds,
            answer.metadata.confidence,
            answer.metadata.speaker_id,
            answer.metadata.emotion,
        ],
    );

    match inserted {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == ErrorCode::ConstraintViolation
                && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            Err(InterviewError::AlreadyAnswered {
                interview_id,
                question_id: answer.question_id,
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Writes both transcription fields onto an existing answer.
pub fn update_transcription(
    conn: &Connection,
    answer_id: i64,
    raw: &str,
    formatted: &str,
) -> Result<(), InterviewError> {
    let count = conn.execute(
        "UPDATE answers SET raw_transcription = ?1, formatted_transcription = ?2 WHERE id = ?3",
        params![raw, formatted, answer_id],
    )?;
    if count == 0 {
        return Err(InterviewError::NotFound {
            entity: "answer",
            id: answer_id,
        });
    }
    Ok(())
}

/// Sets the evaluation score (0-100) and feedback of an answer.
pub fn set_answer_score(
    conn: &Connection,
    answer_id: i64,
    score: f64,
    feedback: Option<&str>,
) -> Result<(), InterviewError> {
    if !(0.0..=100.0).contains(&score) {
        return Err(InterviewError::Validation(format!(
            "score {score} is outside 0-100"
        )));
    }
    let count = conn.execute(
        "UPDATE answers SET score = ?1, feedback = ?2 WHERE id = ?3",
        params![score, feedback, answer_id],
    )?;
    if count == 0 {
        return Err(InterviewError::NotFound {
            entity: "answer",
            id: answer_id,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn parse_label<T>(idx: usize, value: String) -> rusqlite::Result<T>
where
    T: FromStr<Err = ParseLabelError>,
{
    value
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_timestamp(idx: usize, value: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
                })
        })
        .transpose()
}

fn map_row_to_interview(row: &Row) -> rusqlite::Result<Interview> {
    let result: Option<String> = row.get(4)?;
    Ok(Interview {
        id: row.get(0)?,
        candidate_id: row.get(1)?,
        position_id: row.get(2)?,
        status: parse_label(3, row.get(3)?)?,
        result: result.map(|r| parse_label(4, r)).transpose()?,
        ai_score: row.get(5)?,
        started_at: parse_timestamp(6, row.get(6)?)?,
        finished_at: parse_timestamp(7, row.get(7)?)?,
        voice_enabled: row.get(8)?,
        voice_session_id: row.get(9)?,
        voice_agent_id: row.get(10)?,
        voice_started_at: parse_timestamp(11, row.get(11)?)?,
        voice_finished_at: parse_timestamp(12, row.get(12)?)?,
        voice_total_duration: row.get(13)?,
        created_at: row.get(14)?,
    })
}

fn map_row_to_answer(row: &Row) -> rusqlite::Result<Answer> {
    Ok(Answer {
        id: row.get(0)?,
        interview_id: row.get(1)?,
        question_id: row.get(2)?,
        text_answer: row.get(3)?,
        audio_ref: row.get(4)?,
        raw_transcription: row.get(5)?,
        formatted_transcription: row.get(6)?,
        score: row.get(7)?,
        feedback: row.get(8)?,
        duration_seconds: row.get(9)?,
        confidence: row.get(10)?,
        speaker_id: row.get(11)?,
        emotion: row.get(12)?,
        created_at: row.get(13)?,
    })
}
