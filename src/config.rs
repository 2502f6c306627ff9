use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{Result, CaytError};

// Default values for optional configuration keys
fn default_pool_size() -> usize {
    2
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_chunk_pause_ms() -> u64 {
    10
}

fn default_refine_batch_size() -> usize {
    5
}

fn default_refine_max_retries() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub completion: CompletionConfig,
    pub translate: TranslateConfig,
    #[serde(default)]
    pub refine: RefineConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub transcriber: TranscriberConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Ollama endpoint URL
    pub endpoint: String,
    /// LLM model used for analysis, translation and refinement
    pub model: String,
    /// HTTP timeout for a single completion call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Number of completion calls allowed in flight at once
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateConfig {
    /// Default source language code
    pub source_language: String,
    /// Default target language code
    pub target_language: String,
    /// Merged sentences sent per completion round
    pub chunk_size: usize,
    /// Attempts per chunk before falling back to the source text
    pub max_retries: u32,
    /// Pause between attempts of the same chunk
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Pause between chunks
    #[serde(default = "default_chunk_pause_ms")]
    pub chunk_pause_ms: u64,
    /// Ask the LLM for topic/domain/tone before translating
    pub use_context_analysis: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineConfig {
    /// Run the localization pass after translation
    pub enabled: bool,
    /// Segments sent per refinement round
    #[serde(default = "default_refine_batch_size")]
    pub batch_size: usize,
    /// Attempts per batch before keeping the first-pass text
    #[serde(default = "default_refine_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached items
    pub max_size: usize,
    /// Seconds a cached translation stays valid
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directory holding `<item>.<lang>.vtt|srt` captions and `<item>.<ext>` media
    pub caption_dir: PathBuf,
    /// Fall back to speech recognition when no manual caption exists
    pub enable_speech_fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriberConfig {
    /// Path to transcriber binary (e.g., whisper-cli)
    pub binary_path: String,
    /// Path to the ggml model file
    pub model_path: String,
    /// Extra arguments passed verbatim to the transcriber
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            batch_size: default_refine_batch_size(),
            max_retries: default_refine_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            ttl_secs: 3600,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            caption_dir: PathBuf::from("."),
            enable_speech_fallback: true,
        }
    }
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            binary_path: "whisper-cli".to_string(),
            model_path: ".cayt/models/ggml-large-v3-turbo.bin".to_string(),
            extra_args: Vec::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            completion: CompletionConfig {
                endpoint: "http://localhost:11434".to_string(),
                model: "translategemma:4b".to_string(),
                timeout_secs: default_timeout_secs(),
                pool_size: default_pool_size(),
            },
            translate: TranslateConfig {
                source_language: "en".to_string(),
                target_language: "ko".to_string(),
                chunk_size: 30,
                max_retries: 3,
                retry_delay_ms: default_retry_delay_ms(),
                chunk_pause_ms: default_chunk_pause_ms(),
                use_context_analysis: true,
            },
            refine: RefineConfig::default(),
            cache: CacheConfig::default(),
            source: SourceConfig::default(),
            transcriber: TranscriberConfig::default(),
        }
    }
}

impl TranslateConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn chunk_pause(&self) -> Duration {
        Duration::from_millis(self.chunk_pause_ms)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CaytError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| CaytError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CaytError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| CaytError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Reject values that would stall the pipeline
    pub fn validate(&self) -> Result<()> {
        if self.translate.chunk_size == 0 {
            return Err(CaytError::Config("translate.chunk_size must be at least 1".to_string()));
        }
        if self.translate.max_retries == 0 {
            return Err(CaytError::Config("translate.max_retries must be at least 1".to_string()));
        }
        if self.refine.batch_size == 0 || self.refine.max_retries == 0 {
            return Err(CaytError::Config("refine.batch_size and refine.max_retries must be at least 1".to_string()));
        }
        if self.completion.pool_size == 0 {
            return Err(CaytError::Config("completion.pool_size must be at least 1".to_string()));
        }
        if self.cache.max_size == 0 {
            return Err(CaytError::Config("cache.max_size must be at least 1".to_string()));
        }
        Ok(())
    }
}
