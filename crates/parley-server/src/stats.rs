//! Usage statistics.
//!
//! The engine reports what it did to a [`StatsSink`] after the corresponding
//! transaction has committed. A failing sink is logged and otherwise ignored.

use std::sync::Mutex;

use parley_types::InterviewResult;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum UsageEvent {
    VoiceSessionCreated {
        interview_id: i64,
    },
    VoiceSessionEnded {
        interview_id: i64,
        duration_seconds: Option<i64>,
    },
    AnswerRecorded {
        interview_id: i64,
        question_id: i64,
        voice: bool,
    },
    AudioTranscribed {
        answer_id: i64,
        degraded: bool,
    },
    InterviewEvaluated {
        interview_id: i64,
        result: InterviewResult,
    },
}

impl UsageEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::VoiceSessionCreated { .. } => "voice_session_created",
            Self::VoiceSessionEnded { .. } => "voice_session_ended",
            Self::AnswerRecorded { .. } => "answer_recorded",
            Self::AudioTranscribed { .. } => "audio_transcribed",
            Self::InterviewEvaluated { .. } => "interview_evaluated",
        }
    }
}

#[derive(Debug, Error)]
#[error("stats sink failed: {0}")]
pub struct StatsError(pub String);

pub trait StatsSink: Send + Sync {
    fn record(&self, event: &UsageEvent) -> Result<(), StatsError>;
}

/// Records an event, logging instead of propagating sink failures.
pub fn emit(sink: &dyn StatsSink, event: UsageEvent) {
    if let Err(e) = sink.record(&event) {
        tracing::warn!(event = event.name(), error = %e, "failed to record usage statistics");
    }
}

/// Writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStats;

impl StatsSink for TracingStats {
    fn record(&self, event: &UsageEvent) -> Result<(), StatsError> {
        tracing::info!(target: "parley::stats", event = event.name(), detail = ?event, "usage");
        Ok(())
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemoryStats {
    events: Mutex<Vec<UsageEvent>>,
}

impl MemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<UsageEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl StatsSink for MemoryStats {
    fn record(&self, event: &UsageEvent) -> Result<(), StatsError> {
        self.events
            .lock()
            .map_err(|_| StatsError("memory stats lock poisoned".to_string()))?
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenSink;

    impl StatsSink for BrokenSink {
        fn record(&self, _event: &UsageEvent) -> Result<(), StatsError> {
            Err(StatsError("disk full".into()))
        }
    }

    #[test]
    fn memory_stats_keeps_events_in_order() {
        let stats = MemoryStats::new();
        emit(&stats, UsageEvent::VoiceSessionCreated { interview_id: 1 });
        emit(
            &stats,
            UsageEvent::AnswerRecorded {
                interview_id: 1,
                question_id: 3,
                voice: true,
            },
        );
        let names: Vec<_> = stats.events().iter().map(UsageEvent::name).collect();
        assert_eq!(names, vec!["voice_session_created", "answer_recorded"]);
    }

    #[test]
    fn sink_failures_do_not_propagate() {
        emit(&BrokenSink, UsageEvent::VoiceSessionCreated { interview_id: 9 });
    }
}
