//! Shared types, error definitions, and constants for the Parley engine.
//!
//! This crate provides the foundational types used across all Parley crates:
//! interview lifecycle states, verdicts, candidate outcomes, the derived voice
//! session status, voice-quality settings, and the inbound webhook event model.
//!
//! Every other crate in the workspace depends on `parley-types` for
//! cross-cutting definitions, and `parley-types` depends on nothing internal.
//! Status enums are persisted as their upper-snake-case label, so the
//! `label`/`FromStr` pairs below are the storage format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod voice;
pub mod webhook;

pub use voice::{VoiceMetadata, VoiceProfile};
pub use webhook::{SaveAnswerParams, ToolCall, ToolName, WebhookEnvelope, WebhookEventKind};

/// Error returned when a stored or received label does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} label: {label}")]
pub struct ParseLabelError {
    /// Which enum was being parsed.
    pub kind: &'static str,
    /// The offending label.
    pub label: String,
}

/// Lifecycle state of an interview.
///
/// `NotStarted → InProgress → Finished`; `Finished` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterviewStatus {
    /// Created from a candidate, no answers or session yet.
    NotStarted,
    /// Started via the API or a voice session.
    InProgress,
    /// Terminal state.
    Finished,
}

impl InterviewStatus {
    /// Returns the storage label for this status.
    pub fn label(self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Finished => "FINISHED",
        }
    }
}

impl FromStr for InterviewStatus {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_STARTED" => Ok(Self::NotStarted),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "FINISHED" => Ok(Self::Finished),
            other => Err(ParseLabelError {
                kind: "interview status",
                label: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for InterviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Verdict of a finished interview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterviewResult {
    /// Average score met the pass threshold.
    Successful,
    /// Average score fell below the pass threshold.
    Unsuccessful,
    /// The interview could not be evaluated (no answers, agent failure).
    Error,
}

impl InterviewResult {
    /// Returns the storage label for this result.
    pub fn label(self) -> &'static str {
        match self {
            Self::Successful => "SUCCESSFUL",
            Self::Unsuccessful => "UNSUCCESSFUL",
            Self::Error => "ERROR",
        }
    }

    /// The coarse outcome propagated onto the candidate, if any.
    ///
    /// An `Error` verdict says nothing about the candidate, so it maps to `None`.
    pub fn candidate_outcome(self) -> Option<CandidateStatus> {
        match self {
            Self::Successful => Some(CandidateStatus::Hired),
            Self::Unsuccessful => Some(CandidateStatus::Rejected),
            Self::Error => None,
        }
    }
}

impl FromStr for InterviewResult {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESSFUL" => Ok(Self::Successful),
            "UNSUCCESSFUL" => Ok(Self::Unsuccessful),
            "ERROR" => Ok(Self::Error),
            other => Err(ParseLabelError {
                kind: "interview result",
                label: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for InterviewResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Hiring pipeline status of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CandidateStatus {
    New,
    InInterview,
    Hired,
    Rejected,
}

impl CandidateStatus {
    /// Returns the storage label for this status.
    pub fn label(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::InInterview => "IN_INTERVIEW",
            Self::Hired => "HIRED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl FromStr for CandidateStatus {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(Self::New),
            "IN_INTERVIEW" => Ok(Self::InInterview),
            "HIRED" => Ok(Self::Hired),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(ParseLabelError {
                kind: "candidate status",
                label: other.to_string(),
            }),
        }
    }
}

/// Status of the voice session bound to an interview.
///
/// Never persisted: it is derived from the interview row on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoiceSessionStatus {
    Created,
    Active,
    Ended,
    Error,
}

impl VoiceSessionStatus {
    /// Derives the session status from the owning interview's fields.
    ///
    /// Returns `None` when voice was never enabled for the interview.
    pub fn derive(
        voice_enabled: bool,
        status: InterviewStatus,
        result: Option<InterviewResult>,
    ) -> Option<Self> {
        if !voice_enabled {
            return None;
        }
        Some(match (status, result) {
            (_, Some(InterviewResult::Error)) => Self::Error,
            (InterviewStatus::Finished, _) => Self::Ended,
            (InterviewStatus::InProgress, _) => Self::Active,
            (InterviewStatus::NotStarted, _) => Self::Created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels_round_trip() {
        for status in [
            InterviewStatus::NotStarted,
            InterviewStatus::InProgress,
            InterviewStatus::Finished,
        ] {
            assert_eq!(status.label().parse::<InterviewStatus>(), Ok(status));
        }
        assert!("STARTED".parse::<InterviewStatus>().is_err());
    }

    #[test]
    fn result_serializes_as_label() {
        let json = serde_json::to_string(&InterviewResult::Unsuccessful).unwrap();
        assert_eq!(json, "\"UNSUCCESSFUL\"");
        assert_eq!(
            "ERROR".parse::<InterviewResult>(),
            Ok(InterviewResult::Error)
        );
    }

    #[test]
    fn candidate_outcome_mapping() {
        assert_eq!(
            InterviewResult::Successful.candidate_outcome(),
            Some(CandidateStatus::Hired)
        );
        assert_eq!(
            InterviewResult::Unsuccessful.candidate_outcome(),
            Some(CandidateStatus::Rejected)
        );
        assert_eq!(InterviewResult::Error.candidate_outcome(), None);
    }

    #[test]
    fn voice_session_status_derivation() {
        assert_eq!(
            VoiceSessionStatus::derive(false, InterviewStatus::InProgress, None),
            None
        );
        assert_eq!(
            VoiceSessionStatus::derive(true, InterviewStatus::NotStarted, None),
            Some(VoiceSessionStatus::Created)
        );
        assert_eq!(
            VoiceSessionStatus::derive(true, InterviewStatus::InProgress, None),
            Some(VoiceSessionStatus::Active)
        );
        assert_eq!(
            VoiceSessionStatus::derive(
                true,
                InterviewStatus::Finished,
                Some(InterviewResult::Successful)
            ),
            Some(VoiceSessionStatus::Ended)
        );
        assert_eq!(
            VoiceSessionStatus::derive(
                true,
                InterviewStatus::Finished,
                Some(InterviewResult::Error)
            ),
            Some(VoiceSessionStatus::Error)
        );
    }
}
