use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The remote service answered with a 4xx status.
    #[error("remote service rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// Network failure or a 5xx status.
    #[error("remote service unavailable: {0}")]
    Unavailable(String),

    #[error("remote call timed out: {0}")]
    Timeout(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("STT error: {0}")]
    Stt(String),
}

impl VoiceError {
    /// Errors worth another attempt: transient network trouble, 5xx, timeouts.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }

    /// Classifies a transport-level reqwest failure.
    pub(crate) fn from_transport(operation: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(format!("{operation}: {err}"))
        } else if err.is_decode() {
            Self::Decode(format!("{operation}: {err}"))
        } else {
            Self::Unavailable(format!("{operation}: {err}"))
        }
    }
}

/// Maps a non-success status to `Rejected` (4xx) or `Unavailable` (anything else).
pub(crate) async fn check_status(
    operation: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, VoiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status.is_client_error() {
        Err(VoiceError::Rejected {
            status: status.as_u16(),
            body,
        })
    } else {
        Err(VoiceError::Unavailable(format!(
            "{operation} returned {status}: {body}"
        )))
    }
}
