use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::TranscriberConfig;
use crate::error::{Result, CaytError};
use crate::subtitle::{clean_text, Fragment};
use super::{Recognition, SpeechRecognizer};

/// whisper.cpp full JSON output (`-ojf`)
#[derive(Debug, Clone, Deserialize)]
struct WhisperCppOutput {
    #[serde(default)]
    result: Option<WhisperCppResult>,
    #[serde(default)]
    transcription: Vec<WhisperCppSegment>,
}

#[derive(Debug, Clone, Deserialize)]
struct WhisperCppResult {
    language: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct WhisperCppSegment {
    offsets: WhisperCppOffsets,
    text: String,
    #[serde(default)]
    tokens: Vec<WhisperCppToken>,
}

/// Milliseconds from the start of the audio
#[derive(Debug, Clone, Deserialize)]
struct WhisperCppOffsets {
    from: u64,
    to: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct WhisperCppToken {
    #[serde(default)]
    p: Option<f32>,
}

/// Speech recognizer running the whisper.cpp CLI
pub struct WhisperCppRecognizer {
    config: TranscriberConfig,
}

impl WhisperCppRecognizer {
    pub fn new(config: TranscriberConfig) -> Self {
        Self { config }
    }

    /// Convert any media file to the 16 kHz mono WAV whisper.cpp expects
    async fn prepare_audio(&self, media: &Path, work_dir: &Path) -> Result<PathBuf> {
        let is_wav = media
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
        if is_wav {
            return Ok(media.to_path_buf());
        }

        let audio_path = work_dir.join("audio.wav");
        info!("Extracting audio from {}", media.display());

        let output = Command::new("ffmpeg")
            .arg("-i").arg(media)
            .args(["-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1", "-y"])
            .arg(&audio_path)
            .output()
            .await
            .map_err(|e| CaytError::Transcription(format!("Failed to run ffmpeg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaytError::Transcription(format!("Audio extraction failed: {}", stderr)));
        }

        Ok(audio_path)
    }
}

#[async_trait]
impl SpeechRecognizer for WhisperCppRecognizer {
    async fn transcribe(&self, audio: &Path, language_hint: Option<&str>) -> Result<Recognition> {
        info!("Transcribing {} with {}", audio.display(), self.config.binary_path);

        let temp_dir = tempfile::tempdir()
            .map_err(|e| CaytError::Transcription(format!("Failed to create temp directory: {}", e)))?;
        let audio_path = self.prepare_audio(audio, temp_dir.path()).await?;
        let output_prefix = temp_dir.path().join("transcript");

        let mut cmd = Command::new(&self.config.binary_path);
        cmd.arg("-m").arg(&self.config.model_path)
            .arg("-f").arg(&audio_path)
            .arg("-ojf")
            .arg("-of").arg(&output_prefix)
            .arg("-l").arg(language_hint.unwrap_or("auto"))
            .args(&self.config.extra_args);

        debug!("Running transcriber: {:?}", cmd);

        let output = cmd.output().await
            .map_err(|e| CaytError::Transcription(format!("Failed to execute {}: {}", self.config.binary_path, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaytError::Transcription(format!("Transcriber failed: {}", stderr)));
        }

        let json_file = output_prefix.with_extension("json");
        let content = tokio::fs::read_to_string(&json_file).await
            .map_err(|e| CaytError::Transcription(format!("Failed to read output: {}", e)))?;

        parse_whisper_output(&content, language_hint)
    }
}

/// Turn whisper.cpp JSON into a [`Recognition`]
fn parse_whisper_output(content: &str, language_hint: Option<&str>) -> Result<Recognition> {
    let output: WhisperCppOutput = serde_json::from_str(content)
        .map_err(|e| CaytError::Transcription(format!("Failed to parse whisper.cpp JSON: {}", e)))?;

    let probabilities: Vec<f32> = output
        .transcription
        .iter()
        .flat_map(|segment| segment.tokens.iter().filter_map(|t| t.p))
        .collect();
    let confidence = if probabilities.is_empty() {
        0.0
    } else {
        probabilities.iter().sum::<f32>() / probabilities.len() as f32
    };

    let fragments = output
        .transcription
        .into_iter()
        .filter_map(|segment| {
            let text = clean_text(&segment.text);
            (!text.is_empty()).then(|| {
                Fragment::new(
                    segment.offsets.from as f64 / 1000.0,
                    segment.offsets.to as f64 / 1000.0,
                    text,
                )
            })
        })
        .collect();

    let language = output
        .result
        .and_then(|r| r.language)
        .or_else(|| language_hint.map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());

    Ok(Recognition {
        fragments,
        language,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "result": {"language": "en"},
        "transcription": [
            {"timestamps": {"from": "00:00:00,000", "to": "00:00:02,500"},
             "offsets": {"from": 0, "to": 2500},
             "text": " Hello there.",
             "tokens": [{"text": " Hello", "p": 0.75}, {"text": " there.", "p": 0.25}]},
            {"offsets": {"from": 2500, "to": 3000}, "text": "   "},
            {"offsets": {"from": 3000, "to": 4200}, "text": " General  Kenobi."}
        ]
    }"#;

    #[test]
    fn test_parse_whisper_output() {
        let recognition = parse_whisper_output(SAMPLE, None).unwrap();

        assert_eq!(recognition.language, "en");
        assert_eq!(recognition.fragments, vec![
            Fragment::new(0.0, 2.5, "Hello there."),
            Fragment::new(3.0, 4.2, "General Kenobi."),
        ]);
        assert!((recognition.confidence - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_language_falls_back_to_hint() {
        let recognition = parse_whisper_output(r#"{"transcription": []}"#, Some("ja")).unwrap();
        assert_eq!(recognition.language, "ja");
        assert_eq!(recognition.confidence, 0.0);
        assert!(recognition.fragments.is_empty());
    }

    #[test]
    fn test_invalid_json_is_a_transcription_error() {
        let result = parse_whisper_output("not json", None);
        assert!(matches!(result, Err(CaytError::Transcription(_))));
    }

    #[tokio::test]
    async fn test_missing_binary_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("clip.wav");
        std::fs::write(&audio, b"RIFF").unwrap();

        let recognizer = WhisperCppRecognizer::new(TranscriberConfig {
            binary_path: "cayt-test-missing-whisper-binary".to_string(),
            ..TranscriberConfig::default()
        });
        let result = recognizer.transcribe(&audio, Some("en")).await;
        assert!(matches!(result, Err(CaytError::Transcription(_))));
    }
}
