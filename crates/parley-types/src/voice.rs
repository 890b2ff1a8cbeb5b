//! Voice profile and answer metadata definitions.
//!
//! A `VoiceProfile` describes how the remote voice agent should sound when it
//! conducts an interview. `VoiceMetadata` is what the agent reports back about
//! a single spoken answer.

use serde::{Deserialize, Serialize};

/// A voice profile configuration sent with every session request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// Provider-side voice identifier.
    pub voice_id: String,
    /// BCP-47-ish language tag the agent should speak (e.g. `en`, `ru`).
    pub language: String,
    /// Voice stability in `[0.0, 1.0]`. Higher is more monotone.
    pub stability: f32,
    /// How closely the synthesized voice tracks the reference voice, `[0.0, 1.0]`.
    pub similarity_boost: f32,
    /// Style exaggeration, `[0.0, 1.0]`.
    pub style: f32,
    /// Whether the provider should apply speaker boost.
    pub use_speaker_boost: bool,
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self {
            voice_id: "default".to_string(),
            language: "en".to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
            style: 0.0,
            use_speaker_boost: true,
        }
    }
}

impl VoiceProfile {
    /// Clamps all ratio fields into `[0.0, 1.0]`.
    pub fn normalized(mut self) -> Self {
        self.stability = self.stability.clamp(0.0, 1.0);
        self.similarity_boost = self.similarity_boost.clamp(0.0, 1.0);
        self.style = self.style.clamp(0.0, 1.0);
        self
    }
}

/// Quality metadata the voice agent attaches to a spoken answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceMetadata {
    /// Recognition confidence in `[0.0, 1.0]`.
    pub confidence: Option<f64>,
    /// Speaker label assigned by the agent's diarization.
    pub speaker_id: Option<String>,
    /// Detected emotion label, free-form.
    pub emotion: Option<String>,
    /// Length of the spoken answer.
    pub duration_seconds: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_clamps_ratios() {
        let profile = VoiceProfile {
            stability: 1.7,
            similarity_boost: -0.2,
            style: 0.3,
            ..VoiceProfile::default()
        }
        .normalized();
        assert_eq!(profile.stability, 1.0);
        assert_eq!(profile.similarity_boost, 0.0);
        assert_eq!(profile.style, 0.3);
    }

    #[test]
    fn metadata_uses_camel_case() {
        let meta: VoiceMetadata = serde_json::from_str(
            r#"{"confidence":0.91,"speakerId":"spk_0","durationSeconds":12.5}"#,
        )
        .unwrap();
        assert_eq!(meta.confidence, Some(0.91));
        assert_eq!(meta.speaker_id.as_deref(), Some("spk_0"));
        assert_eq!(meta.duration_seconds, Some(12.5));
        assert!(meta.emotion.is_none());
    }
}
