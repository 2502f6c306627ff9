use serde::{Deserialize, Serialize};

/// Source and target language codes for one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguagePair {
    pub source: String,
    pub target: String,
}

impl LanguagePair {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    pub fn source_name(&self) -> String {
        language_name(&self.source)
    }

    pub fn target_name(&self) -> String {
        language_name(&self.target)
    }

    /// Whether the pair is `source` to `target`, ignoring region subtags and case
    pub fn matches(&self, source: &str, target: &str) -> bool {
        primary_code(&self.source) == primary_code(source)
            && primary_code(&self.target) == primary_code(target)
    }
}

/// Lowercased primary subtag: `pt-BR` -> `pt`
pub fn primary_code(code: &str) -> String {
    code.trim().split(['-', '_']).next().unwrap_or(code).to_lowercase()
}

/// Convert language code to full language name for clearer prompts
pub fn language_name(code: &str) -> String {
    let name = match primary_code(code).as_str() {
        "en" => "English",
        "ko" => "Korean",
        "ja" => "Japanese",
        "zh" => "Chinese",
        "fr" => "French",
        "de" => "German",
        "es" => "Spanish",
        "it" => "Italian",
        "pt" => "Portuguese",
        "ru" => "Russian",
        "nl" => "Dutch",
        "pl" => "Polish",
        "tr" => "Turkish",
        "ar" => "Arabic",
        "hi" => "Hindi",
        "th" => "Thai",
        "vi" => "Vietnamese",
        "id" => "Indonesian",
        "sv" => "Swedish",
        "uk" => "Ukrainian",
        _ => return code.to_string(),
    };
    name.to_string()
}
