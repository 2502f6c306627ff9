// Fragment acquisition
//
// Collaborators that turn an item reference into timestamped fragments:
// - CaptionSource: caption listing, manual caption download, audio download
// - SpeechRecognizer: speech-to-text over a local audio file
// FragmentExtractor picks a manual caption first and falls back to speech.

pub mod local;
pub mod whisper_cpp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub use local::LocalCaptionSource;
pub use whisper_cpp::WhisperCppRecognizer;
use crate::error::{Result, CaytError};
use crate::subtitle::{parse_cues, Fragment};

/// Where the fragments of a job came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Uploaded caption track
    Manual,
    /// Speech recognition output
    Speech,
    /// Fragments handed in by the caller
    Provided,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Manual => "manual",
            SourceType::Speech => "speech",
            SourceType::Provided => "provided",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionKind {
    Manual,
    Automatic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionTrack {
    pub language_code: String,
    pub kind: CaptionKind,
}

/// Speech recognition result
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub fragments: Vec<Fragment>,
    pub language: String,
    /// Mean token probability, 0.0 when the engine reports none
    pub confidence: f32,
}

#[async_trait]
pub trait CaptionSource: Send + Sync {
    /// Human-readable title of the item
    async fn title(&self, item_ref: &str) -> Result<String> {
        Ok(item_ref.to_string())
    }

    async fn list_available_captions(&self, item_ref: &str) -> Result<Vec<CaptionTrack>>;

    /// Raw cue text (WebVTT or SRT) of a manual caption track
    async fn fetch_manual_caption(&self, item_ref: &str, language_code: &str) -> Result<String>;

    /// Local path of the item's audio
    async fn fetch_audio(&self, item_ref: &str) -> Result<PathBuf>;
}

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn transcribe(&self, audio: &Path, language_hint: Option<&str>) -> Result<Recognition>;
}

/// Fragments of one item ready for translation
#[derive(Debug, Clone)]
pub struct ExtractedTranscript {
    pub item_id: String,
    pub title: String,
    pub language: String,
    pub source_type: SourceType,
    pub fragments: Vec<Fragment>,
}

/// Manual caption first, speech recognition otherwise
pub struct FragmentExtractor {
    captions: Arc<dyn CaptionSource>,
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    enable_speech_fallback: bool,
}

impl FragmentExtractor {
    pub fn new(
        captions: Arc<dyn CaptionSource>,
        recognizer: Option<Arc<dyn SpeechRecognizer>>,
        enable_speech_fallback: bool,
    ) -> Self {
        Self {
            captions,
            recognizer,
            enable_speech_fallback,
        }
    }

    /// Extract fragments for `item_ref` in `language` (`auto` lets the
    /// recognizer detect it). `force_speech` skips the caption lookup.
    pub async fn extract(&self, item_ref: &str, language: &str, force_speech: bool) -> Result<ExtractedTranscript> {
        let title = match self.captions.title(item_ref).await {
            Ok(title) => title,
            Err(e) => {
                warn!("Could not read title of {}: {}", item_ref, e);
                String::new()
            }
        };

        if force_speech {
            info!("Speech recognition forced for {}", item_ref);
            return self.extract_speech(item_ref, title, language).await;
        }

        let tracks = self.captions.list_available_captions(item_ref).await?;
        let has_manual = tracks
            .iter()
            .any(|t| t.kind == CaptionKind::Manual && t.language_code == language);

        if has_manual {
            info!("Manual caption found for {} ({})", item_ref, language);
            let cues = self.captions.fetch_manual_caption(item_ref, language).await?;
            let fragments = parse_cues(&cues);
            if fragments.is_empty() {
                return Err(CaytError::Extraction(format!(
                    "caption '{}' of {} has no cues", language, item_ref
                )));
            }
            return Ok(ExtractedTranscript {
                item_id: item_ref.to_string(),
                title,
                language: language.to_string(),
                source_type: SourceType::Manual,
                fragments,
            });
        }

        if !self.enable_speech_fallback {
            return Err(CaytError::Extraction(format!(
                "no '{}' manual caption for {} and speech recognition is disabled", language, item_ref
            )));
        }

        info!("No manual caption for {}, using speech recognition", item_ref);
        self.extract_speech(item_ref, title, language).await
    }

    async fn extract_speech(&self, item_ref: &str, title: String, language: &str) -> Result<ExtractedTranscript> {
        let recognizer = self.recognizer.as_ref().ok_or_else(|| {
            CaytError::Extraction("no speech recognizer configured".to_string())
        })?;

        let audio = self.captions.fetch_audio(item_ref).await?;
        let hint = (language != "auto").then_some(language);

        let recognition = recognizer
            .transcribe(&audio, hint)
            .await
            .map_err(|e| CaytError::Extraction(format!("speech recognition failed: {}", e)))?;

        info!(
            "Speech recognition finished: {} fragments, language={}, confidence={:.2}",
            recognition.fragments.len(), recognition.language, recognition.confidence
        );

        if recognition.fragments.is_empty() {
            return Err(CaytError::Extraction(format!("no speech recognized in {}", item_ref)));
        }

        Ok(ExtractedTranscript {
            item_id: item_ref.to_string(),
            title,
            language: recognition.language,
            source_type: SourceType::Speech,
            fragments: recognition.fragments,
        })
    }
}
