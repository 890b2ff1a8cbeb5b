//! Turning answer scores into a verdict.
//!
//! Answer scores live on a 0-100 scale. The rubric oracle answers on a 1-10
//! scale which is multiplied by ten before storage; a stored 0 marks an answer
//! whose rubric reply could not be parsed and is left out of the average.

use crate::model::Position;
use parley_types::InterviewResult;
use serde::{Deserialize, Serialize};

/// Default pass threshold on the 0-100 scale.
pub const DEFAULT_PASS_THRESHOLD: f64 = 70.0;

/// Whether an average equal to the threshold passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdComparison {
    /// `average >= threshold` passes.
    #[default]
    Inclusive,
    /// `average > threshold` passes.
    Exclusive,
}

/// How an interview's answer scores become a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    /// Threshold used when the position has no `min_score` of its own.
    pub pass_threshold: f64,
    pub comparison: ThresholdComparison,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            pass_threshold: DEFAULT_PASS_THRESHOLD,
            comparison: ThresholdComparison::Inclusive,
        }
    }
}

/// The verdict together with the average it was derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub average: f64,
    pub result: InterviewResult,
}

impl ScoringPolicy {
    /// The threshold that applies to a position.
    pub fn threshold_for(&self, position: &Position) -> f64 {
        position.min_score.unwrap_or(self.pass_threshold)
    }

    /// Compares an average against a threshold.
    pub fn passes(&self, average: f64, threshold: f64) -> bool {
        match self.comparison {
            ThresholdComparison::Inclusive => average >= threshold,
            ThresholdComparison::Exclusive => average > threshold,
        }
    }

    /// Averages the gradeable scores and compares them against `threshold`.
    ///
    /// Returns `None` when no score is gradeable (every score absent or 0).
    pub fn decide<I>(&self, scores: I, threshold: f64) -> Option<Verdict>
    where
        I: IntoIterator<Item = f64>,
    {
        let average = average_score(scores)?;
        let result = if self.passes(average, threshold) {
            InterviewResult::Successful
        } else {
            InterviewResult::Unsuccessful
        };
        Some(Verdict { average, result })
    }
}

/// Mean of the scores greater than zero.
pub fn average_score<I>(scores: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = scores
        .into_iter()
        .filter(|s| *s > 0.0)
        .fold((0.0, 0usize), |(sum, count), s| (sum + s, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Parses a rubric reply into a score in `[1, 10]`.
///
/// Oracles wrap the number in prose ("Score: 8/10", "**7**"), so the first
/// numeric token is taken, rounded and clamped. `None` when the reply has no
/// digits at all.
pub fn parse_rubric_score(reply: &str) -> Option<u8> {
    let start = reply.find(|c: char| c.is_ascii_digit())?;
    let token: String = reply[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let value: f64 = token.trim_end_matches('.').parse().ok()?;
    Some(value.round().clamp(1.0, 10.0) as u8)
}

/// Converts a rubric score (1-10) to the stored 0-100 scale.
pub fn normalize_rubric_score(score: u8) -> f64 {
    f64::from(score) * 10.0
}
