use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaytError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A collaborator could not produce fragments for an item.
    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    /// A single completion call failed; absorbed by retries inside a job.
    #[error("Completion error: {0}")]
    Completion(String),

    #[error("Completion service unreachable: {0}")]
    Unreachable(String),

    #[error("Item is already being translated: {0}")]
    DuplicateInFlight(String),

    /// Defect in context, merge or remap logic.
    #[error("Translation error: {0}")]
    Translation(String),
}

pub type Result<T> = std::result::Result<T, CaytError>;
