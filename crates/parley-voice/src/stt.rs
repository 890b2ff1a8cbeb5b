use crate::config::{SttBackend, SttConfig};
use crate::error::{check_status, VoiceError};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Maximum audio input size for STT (10 MiB). Prevents OOM from oversized payloads.
pub const MAX_STT_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Speech-to-text oracle.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribes an audio clip. `content_type` is the clip's MIME type.
    async fn transcribe(&self, audio: &[u8], content_type: &str) -> Result<String, VoiceError>;

    /// Liveness check; never errors.
    async fn is_available(&self) -> bool;
}

/// Builds the backend selected in the config.
pub fn build_speech_to_text(config: &SttConfig) -> Result<Arc<dyn SpeechToText>, VoiceError> {
    let stt: Arc<dyn SpeechToText> = match config.backend {
        SttBackend::Http => Arc::new(HttpSpeechToText::new(config)?),
        SttBackend::WhisperCli => Arc::new(
            WhisperCliStt::new(config.model_path.clone(), config.binary_path.clone())
                .with_timeout(config.timeout()),
        ),
    };
    Ok(stt)
}

fn check_size(audio: &[u8]) -> Result<(), VoiceError> {
    if audio.len() > MAX_STT_INPUT_BYTES {
        return Err(VoiceError::Stt(format!(
            "audio data exceeds maximum size: {} bytes (limit: {} bytes)",
            audio.len(),
            MAX_STT_INPUT_BYTES
        )));
    }
    if audio.is_empty() {
        return Err(VoiceError::Stt("audio data is empty".to_string()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    text: String,
}

/// Transcription over HTTP: `POST {base}/v1/transcribe` with the raw clip.
#[derive(Debug, Clone)]
pub struct HttpSpeechToText {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl HttpSpeechToText {
    pub fn new(config: &SttConfig) -> Result<Self, VoiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build STT client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            retry: config.retry_policy(),
        })
    }

    async fn transcribe_once(&self, audio: &[u8], content_type: &str) -> Result<String, VoiceError> {
        let mut request = self
            .client
            .post(format!("{}/v1/transcribe", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(audio.to_vec());
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VoiceError::from_transport("transcription", e))?;
        let response = check_status("transcription", response).await?;
        let parsed: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::Decode(format!("transcription: {e}")))?;
        Ok(parsed.text.trim().to_string())
    }
}

#[async_trait]
impl SpeechToText for HttpSpeechToText {
    async fn transcribe(&self, audio: &[u8], content_type: &str) -> Result<String, VoiceError> {
        check_size(audio)?;
        self.retry
            .run("transcription", || self.transcribe_once(audio, content_type))
            .await
    }

    async fn is_available(&self) -> bool {
        match self.client.get(format!("{}/health", self.base_url)).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "STT health check failed");
                false
            }
        }
    }
}

/// Default timeout for the local STT process.
const STT_TIMEOUT: Duration = Duration::from_secs(120);

/// Transcription through a local whisper.cpp-compatible binary.
#[derive(Debug, Clone)]
pub struct WhisperCliStt {
    model_path: PathBuf,
    binary_path: PathBuf,
    timeout: Duration,
}

impl WhisperCliStt {
    pub fn new(model_path: impl Into<PathBuf>, binary_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            binary_path: binary_path.into(),
            timeout: STT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl SpeechToText for WhisperCliStt {
    async fn transcribe(&self, audio: &[u8], _content_type: &str) -> Result<String, VoiceError> {
        check_size(audio)?;

        // whisper.cpp: -m <model> selects the GGML model, -f - reads stdin.
        let mut command = Command::new(&self.binary_path);
        command
            .arg("-m")
            .arg(&self.model_path)
            .arg("-f")
            .arg("-")
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| VoiceError::Stt(format!("failed to spawn STT binary: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| VoiceError::Stt("failed to open stdin".to_string()))?;
        stdin
            .write_all(audio)
            .await
            .map_err(|e| VoiceError::Stt(format!("failed to write to stdin: {e}")))?;
        drop(stdin);

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                VoiceError::Timeout(format!(
                    "STT process exceeded {} seconds",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| VoiceError::Stt(format!("failed to read stdout: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceError::Stt(format!("STT binary failed: {stderr}")));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn is_available(&self) -> bool {
        let model = tokio::fs::metadata(&self.model_path).await.is_ok();
        let binary = if self.binary_path.components().count() > 1 {
            tokio::fs::metadata(&self.binary_path).await.is_ok()
        } else {
            // Bare names resolve through PATH at spawn time.
            true
        };
        model && binary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn oversized_audio_is_rejected_before_spawning() {
        let stt = WhisperCliStt::new("/nonexistent/model.bin", "/nonexistent/whisper");
        let audio = vec![0u8; MAX_STT_INPUT_BYTES + 1];
        let err = stt.transcribe(&audio, "audio/wav").await.unwrap_err();
        assert!(err.to_string().contains("exceeds maximum size"));
    }

    #[tokio::test]
    async fn missing_model_is_unavailable() {
        let stt = WhisperCliStt::new("/nonexistent/model.bin", "whisper-cli");
        assert!(!stt.is_available().await);
    }

    #[tokio::test]
    async fn missing_binary_fails_with_stt_error() {
        let stt = WhisperCliStt::new("/nonexistent/model.bin", "/nonexistent/whisper");
        let err = stt.transcribe(b"RIFF", "audio/wav").await.unwrap_err();
        assert!(matches!(err, VoiceError::Stt(_)));
    }
}
