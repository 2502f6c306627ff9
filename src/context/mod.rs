// Per-item translation context
//
// - classifier: keyword scoring and glossary lookup, no I/O
// - builder: optional LLM analysis layered over the classifier

pub mod builder;
pub mod classifier;

use serde::{Deserialize, Serialize};

pub use builder::{extract_first_json_object, ContextBuilder};
pub use classifier::{classify, extract_terms, glossary_applies, GENERAL_DOMAIN};
use crate::language::LanguagePair;

/// Speech register the translation should use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Formal,
    Informal,
}

impl Tone {
    /// Anything other than `informal` is formal
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("informal") {
            Tone::Informal
        } else {
            Tone::Formal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Formal => "formal",
            Tone::Informal => "informal",
        }
    }
}

/// Context shared by every prompt of one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationContext {
    pub topic: String,
    pub domain: String,
    /// Source term to preferred translation, in table order
    pub glossary: Vec<(String, String)>,
    pub tone: Tone,
}

impl Default for TranslationContext {
    fn default() -> Self {
        Self {
            topic: String::new(),
            domain: GENERAL_DOMAIN.to_string(),
            glossary: Vec::new(),
            tone: Tone::Formal,
        }
    }
}

impl TranslationContext {
    /// Context from keyword rules only
    pub fn rule_based(text: &str) -> Self {
        let (domain, _) = classify(text);
        let glossary = extract_terms(text, &domain);
        Self {
            domain,
            glossary,
            ..Self::default()
        }
    }

    /// Drop the glossary when its term tables do not cover `languages`
    pub fn restrict_glossary(&mut self, languages: &LanguagePair) {
        if !self.glossary.is_empty() && !glossary_applies(languages) {
            self.glossary.clear();
        }
    }

    /// `source = target` lines for prompts, or `(none)`
    pub fn glossary_lines(&self) -> String {
        if self.glossary.is_empty() {
            return "(none)".to_string();
        }
        self.glossary
            .iter()
            .map(|(source, target)| format!("{} = {}", source, target))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("[domain: {}]", self.domain)];
        if !self.topic.is_empty() {
            parts.push(format!("[topic: {}]", self.topic));
        }
        if !self.glossary.is_empty() {
            let terms = self.glossary
                .iter()
                .map(|(source, target)| format!("{}={}", source, target))
                .collect::<Vec<_>>()
                .join(", ");
            parts.push(format!("[glossary: {}]", terms));
        }
        parts.push(format!("[tone: {}]", self.tone.as_str()));
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_parse() {
        assert_eq!(Tone::parse("Informal"), Tone::Informal);
        assert_eq!(Tone::parse(" informal "), Tone::Informal);
        assert_eq!(Tone::parse("casual"), Tone::Formal);
        assert_eq!(Tone::parse(""), Tone::Formal);
    }

    #[test]
    fn test_glossary_lines() {
        let mut context = TranslationContext::default();
        assert_eq!(context.glossary_lines(), "(none)");

        context.glossary = vec![
            ("function".to_string(), "함수".to_string()),
            ("server".to_string(), "서버".to_string()),
        ];
        assert_eq!(context.glossary_lines(), "function = 함수\nserver = 서버");
        assert!(context.summary().contains("[glossary: function=함수, server=서버]"));
    }

    #[test]
    fn test_restrict_glossary_to_table_languages() {
        let text = "This function calls the server and the database through an api.";
        let mut korean = TranslationContext::rule_based(text);
        assert!(!korean.glossary.is_empty());
        korean.restrict_glossary(&LanguagePair::new("en", "ko"));
        assert!(!korean.glossary.is_empty());

        let mut japanese = TranslationContext::rule_based(text);
        japanese.restrict_glossary(&LanguagePair::new("en", "ja"));
        assert!(japanese.glossary.is_empty());
        assert_eq!(japanese.domain, "IT");
    }
}
