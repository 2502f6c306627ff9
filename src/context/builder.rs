use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::completion::{CompletionPool, CompletionRequest, SamplingOptions};
use crate::error::{Result, CaytError};
use super::classifier::{domain_names, extract_terms, GENERAL_DOMAIN};
use super::{Tone, TranslationContext};

/// Characters of transcript text sent for analysis
pub const ANALYSIS_SAMPLE_CHARS: usize = 2000;

const ANALYSIS_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnalysisReply {
    topic: String,
    domain: String,
    tone: String,
}

/// Builds the per-item [`TranslationContext`]
pub struct ContextBuilder {
    pool: CompletionPool,
}

impl ContextBuilder {
    pub fn new(pool: CompletionPool) -> Self {
        Self { pool }
    }

    /// Build the context for a transcript. Never fails: any analysis problem
    /// degrades to the keyword rules.
    pub async fn build_context(&self, full_text: &str, use_external_analysis: bool) -> TranslationContext {
        if !use_external_analysis {
            return TranslationContext::rule_based(full_text);
        }

        match self.analyze(full_text).await {
            Ok(reply) => {
                let domain = match reply.domain.trim() {
                    "" => GENERAL_DOMAIN.to_string(),
                    domain => domain.to_string(),
                };
                let context = TranslationContext {
                    topic: reply.topic.trim().to_string(),
                    glossary: extract_terms(full_text, &domain),
                    domain,
                    tone: Tone::parse(&reply.tone),
                };
                info!("Context analysis: {}", context.summary());
                context
            }
            Err(e) => {
                warn!("Context analysis failed, using keyword rules: {}", e);
                TranslationContext::rule_based(full_text)
            }
        }
    }

    async fn analyze(&self, full_text: &str) -> Result<AnalysisReply> {
        let sample: String = full_text.chars().take(ANALYSIS_SAMPLE_CHARS).collect();
        let request = CompletionRequest::new(
            build_analysis_prompt(&sample),
            SamplingOptions::with_temperature(ANALYSIS_TEMPERATURE),
        );

        let reply = self.pool.complete(request).await?;
        debug!("Raw context analysis reply: {}", reply);

        let object = extract_first_json_object(&reply)
            .ok_or_else(|| CaytError::Completion("no JSON object in analysis reply".to_string()))?;

        Ok(serde_json::from_str(object)?)
    }
}

fn build_analysis_prompt(sample: &str) -> String {
    let domains = domain_names()
        .chain(std::iter::once(GENERAL_DOMAIN))
        .collect::<Vec<_>>()
        .join("/");

    format!(
        "Analyze the following excerpt of video subtitles and answer in JSON.\n\
         \n\
         Subtitle sample:\n\
         \"\"\"\n\
         {}\n\
         \"\"\"\n\
         \n\
         Reply only in this format, with no other explanation:\n\
         {{\n\
         \x20   \"topic\": \"short description of the video topic (e.g. Python web development lecture)\",\n\
         \x20   \"domain\": \"one of {}\",\n\
         \x20   \"tone\": \"appropriate register (formal/informal)\"\n\
         }}",
        sample, domains
    )
}

/// First balanced top-level `{...}` in `text`.
///
/// Braces inside JSON strings are ignored, including escaped quotes.
pub fn extract_first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::MockCompletionService;
    use std::sync::Arc;

    const IT_TEXT: &str = "Today we debug a python function on the server and check the database query.";

    fn builder_with_reply(reply: Result<String>) -> ContextBuilder {
        let mut mock = MockCompletionService::new();
        let mut reply = Some(reply);
        mock.expect_complete()
            .times(1)
            .returning(move |_| reply.take().unwrap_or_else(|| Ok(String::new())));
        ContextBuilder::new(CompletionPool::new(Arc::new(mock), 2))
    }

    #[test]
    fn test_extract_json_from_chatter() {
        let reply = "Sure! Here it is:\n{\"topic\": \"rust\", \"domain\": \"IT\"}\nHope that helps {}";
        assert_eq!(
            extract_first_json_object(reply),
            Some("{\"topic\": \"rust\", \"domain\": \"IT\"}")
        );
    }

    #[test]
    fn test_extract_json_ignores_braces_in_strings() {
        let reply = r#"{"topic": "closing } brace and \"quoted {\"", "nested": {"a": 1}} trailing"#;
        let object = extract_first_json_object(reply).unwrap();
        assert!(object.ends_with("{\"a\": 1}}"));
        assert!(serde_json::from_str::<serde_json::Value>(object).is_ok());
    }

    #[test]
    fn test_extract_json_unbalanced() {
        assert_eq!(extract_first_json_object("no json here"), None);
        assert_eq!(extract_first_json_object("{\"topic\": \"open"), None);
    }

    #[tokio::test]
    async fn test_llm_domain_drives_glossary() {
        let builder = builder_with_reply(Ok(
            "```json\n{\"topic\": \"Python backend\", \"domain\": \"IT\", \"tone\": \"Informal\"}\n```".to_string(),
        ));
        let context = builder.build_context(IT_TEXT, true).await;

        assert_eq!(context.topic, "Python backend");
        assert_eq!(context.domain, "IT");
        assert_eq!(context.tone, Tone::Informal);
        assert_eq!(context.glossary, extract_terms(IT_TEXT, "IT"));
        assert!(!context.glossary.is_empty());
    }

    #[tokio::test]
    async fn test_missing_fields_take_defaults() {
        let builder = builder_with_reply(Ok("{\"topic\": \"cats\"}".to_string()));
        let context = builder.build_context("cats are great", true).await;

        assert_eq!(context.topic, "cats");
        assert_eq!(context.domain, GENERAL_DOMAIN);
        assert_eq!(context.tone, Tone::Formal);
    }

    #[tokio::test]
    async fn test_malformed_reply_falls_back_to_rules() {
        let builder = builder_with_reply(Ok("{\"topic\": oops}".to_string()));
        let context = builder.build_context(IT_TEXT, true).await;
        assert_eq!(context, TranslationContext::rule_based(IT_TEXT));
        assert_eq!(context.domain, "IT");
    }

    #[tokio::test]
    async fn test_call_failure_falls_back_to_rules() {
        let builder = builder_with_reply(Err(CaytError::Completion("timeout".to_string())));
        let context = builder.build_context(IT_TEXT, true).await;
        assert_eq!(context.domain, "IT");
        assert!(context.topic.is_empty());
    }

    #[tokio::test]
    async fn test_rules_only_makes_no_calls() {
        let mut mock = MockCompletionService::new();
        mock.expect_complete().never();
        let builder = ContextBuilder::new(CompletionPool::new(Arc::new(mock), 2));

        let context = builder.build_context("", false).await;
        assert_eq!(context.domain, GENERAL_DOMAIN);
        assert!(context.glossary.is_empty());
    }

    #[test]
    fn test_prompt_lists_domains() {
        let prompt = build_analysis_prompt("hello");
        assert!(prompt.contains("IT/cooking/gaming/business/science/education/news/general"));
        assert!(prompt.contains("\"topic\""));
    }
}
