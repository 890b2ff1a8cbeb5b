//! Audio answer transcription: speech-to-text, then a formatting pass.

use std::sync::Arc;

use parley_db::DbPool;
use parley_interview::store;
use parley_voice::{SpeechToText, TextGenerator};
use serde::Serialize;

use crate::error::{run_blocking, EngineError};
use crate::stats::{emit, StatsSink, UsageEvent};

/// System instruction for the formatting pass.
pub const FORMAT_INSTRUCTION: &str = "You format interview answer transcripts. \
Fix punctuation, capitalization and paragraph breaks only. Never add, remove or \
reword information. Reply with the formatted transcript and nothing else.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub raw: String,
    pub formatted: String,
    /// The formatting pass failed and `formatted` is the raw text.
    pub degraded: bool,
}

pub struct TranscriptionPipeline {
    pool: DbPool,
    stt: Arc<dyn SpeechToText>,
    llm: Arc<dyn TextGenerator>,
    stats: Arc<dyn StatsSink>,
}

impl TranscriptionPipeline {
    pub fn new(
        pool: DbPool,
        stt: Arc<dyn SpeechToText>,
        llm: Arc<dyn TextGenerator>,
        stats: Arc<dyn StatsSink>,
    ) -> Self {
        Self {
            pool,
            stt,
            llm,
            stats,
        }
    }

    /// Both oracles answer their health checks.
    pub async fn is_available(&self) -> bool {
        let (stt, llm) = tokio::join!(self.stt.is_available(), self.llm.is_available());
        if !stt || !llm {
            tracing::debug!(stt, llm, "transcription pipeline unavailable");
        }
        stt && llm
    }

    /// Runs speech-to-text and the formatting pass without storing anything.
    ///
    /// A blank recognition result skips the formatter.
    ///
    /// # Errors
    ///
    /// `ServiceUnavailable` when speech-to-text fails. A formatting failure
    /// only degrades the result.
    pub async fn transcribe(
        &self,
        audio: &[u8],
        content_type: &str,
    ) -> Result<Transcript, EngineError> {
        let raw = self
            .stt
            .transcribe(audio, content_type)
            .await
            .map_err(|e| EngineError::ServiceUnavailable(format!("speech-to-text: {e}")))?;
        let raw = raw.trim().to_string();
        if raw.is_empty() {
            tracing::warn!(bytes = audio.len(), "speech-to-text returned no text");
            return Ok(Transcript {
                raw: String::new(),
                formatted: String::new(),
                degraded: false,
            });
        }

        let (formatted, degraded) = match self.llm.generate(&raw, Some(FORMAT_INSTRUCTION)).await {
            Ok(text) if !text.trim().is_empty() => (text.trim().to_string(), false),
            Ok(_) => {
                tracing::warn!("formatter returned empty text, keeping raw transcript");
                (raw.clone(), true)
            }
            Err(e) => {
                tracing::warn!(error = %e, "formatting failed, keeping raw transcript");
                (raw.clone(), true)
            }
        };
        Ok(Transcript {
            raw,
            formatted,
            degraded,
        })
    }

    /// Transcribes `audio` and stores both transcripts on answer `answer_id`.
    ///
    /// # Errors
    ///
    /// `NotFound` when the answer does not exist; otherwise as
    /// [`transcribe`](Self::transcribe).
    pub async fn process(
        &self,
        audio: &[u8],
        content_type: &str,
        answer_id: i64,
    ) -> Result<Transcript, EngineError> {
        run_blocking(&self.pool, move |conn| {
            store::get_answer(conn, answer_id)?;
            Ok(())
        })
        .await?;

        let transcript = self.transcribe(audio, content_type).await?;

        let (stored_raw, stored_formatted) =
            (transcript.raw.clone(), transcript.formatted.clone());
        run_blocking(&self.pool, move |conn| {
            Ok(store::update_transcription(
                conn,
                answer_id,
                &stored_raw,
                &stored_formatted,
            )?)
        })
        .await?;

        self.transcribed(answer_id, audio.len(), &transcript);
        Ok(transcript)
    }

    /// Reports a stored transcript to stats and the log.
    pub fn transcribed(&self, answer_id: i64, bytes: usize, transcript: &Transcript) {
        emit(
            self.stats.as_ref(),
            UsageEvent::AudioTranscribed {
                answer_id,
                degraded: transcript.degraded,
            },
        );
        tracing::info!(
            answer_id,
            bytes,
            degraded = transcript.degraded,
            "audio answer transcribed"
        );
    }
}
