use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::completion::{CompletionPool, CompletionRequest, SamplingOptions};
use crate::config::TranslateConfig;
use crate::context::{glossary_applies, TranslationContext};
use crate::error::{Result, CaytError};
use crate::language::LanguagePair;
use crate::subtitle::Fragment;
use super::{MergedSentence, StageOutput, TranslatedSegment};

const TRANSLATION_TEMPERATURE: f32 = 0.3;

static INDEX_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("marker pattern is valid"));

/// Chunked translation of merged sentences
pub struct TranslationEngine {
    pool: CompletionPool,
    config: TranslateConfig,
}

impl TranslationEngine {
    pub fn new(pool: CompletionPool, config: TranslateConfig) -> Self {
        Self { pool, config }
    }

    /// Translate `sentences` chunk by chunk and remap every result onto the
    /// timing of `fragments`.
    ///
    /// Cancellation is honoured at entry and between chunks; the output then
    /// holds only the chunks finished before it. A sentence pointing outside
    /// `fragments` is an error.
    pub async fn translate(
        &self,
        sentences: &[MergedSentence],
        context: &TranslationContext,
        languages: &LanguagePair,
        fragments: &[Fragment],
        cancel: &CancelToken,
    ) -> Result<StageOutput<TranslatedSegment>> {
        let mut segments = Vec::with_capacity(sentences.len());
        if cancel.is_cancelled() {
            return Ok(StageOutput::cancelled(segments));
        }

        let chunk_size = self.config.chunk_size.max(1);
        let total_chunks = sentences.len().div_ceil(chunk_size);

        for (chunk_index, chunk) in sentences.chunks(chunk_size).enumerate() {
            if chunk_index > 0 {
                tokio::time::sleep(self.config.chunk_pause()).await;
                if cancel.is_cancelled() {
                    info!("Translation cancelled after {}/{} chunks", chunk_index, total_chunks);
                    return Ok(StageOutput::cancelled(segments));
                }
            }

            info!(
                "Translating chunk {}/{} ({} sentences)",
                chunk_index + 1, total_chunks, chunk.len()
            );

            let translations = self.translate_chunk(chunk, context, languages).await;
            segments.extend(remap(chunk, translations.as_ref(), fragments)?);
        }

        Ok(StageOutput::completed(segments))
    }

    /// Reply map for one chunk, or `None` when every attempt failed
    async fn translate_chunk(
        &self,
        chunk: &[MergedSentence],
        context: &TranslationContext,
        languages: &LanguagePair,
    ) -> Option<HashMap<usize, String>> {
        let request = CompletionRequest::new(
            build_translation_prompt(chunk, context, languages),
            SamplingOptions::with_temperature(TRANSLATION_TEMPERATURE),
        );
        let max_attempts = self.config.max_retries.max(1);

        for attempt in 1..=max_attempts {
            match self.pool.complete(request.clone()).await {
                Ok(reply) => {
                    debug!("Translation reply: {} chars", reply.len());
                    return Some(parse_numbered_reply(&reply));
                }
                Err(e) => {
                    warn!("Translation attempt {}/{} failed: {}", attempt, max_attempts, e);
                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.retry_delay()).await;
                    }
                }
            }
        }

        warn!("Keeping source text for {} sentences after {} failed attempts", chunk.len(), max_attempts);
        None
    }
}

/// Numbered prompt for one chunk; sentences are numbered from 1
pub fn build_translation_prompt(
    chunk: &[MergedSentence],
    context: &TranslationContext,
    languages: &LanguagePair,
) -> String {
    let numbered = chunk
        .iter()
        .enumerate()
        .map(|(i, sentence)| format!("[{}] {}", i + 1, sentence.text))
        .collect::<Vec<_>>()
        .join("\n");

    let source = languages.source_name();
    let target = languages.target_name();
    let topic = if context.topic.is_empty() { "video subtitles" } else { context.topic.as_str() };
    let glossary = if glossary_applies(languages) {
        context.glossary_lines()
    } else {
        "(none)".to_string()
    };

    format!(
        "You are a professional video subtitle translator.\n\
         \n\
         ## Translation info\n\
         - Domain: {domain}\n\
         - Topic: {topic}\n\
         - Source language: {source}\n\
         - Target language: {target}\n\
         - Tone: {tone}\n\
         \n\
         ## Glossary (always use these translations)\n\
         {glossary}\n\
         \n\
         ## Rules\n\
         1. Write the translation in {target} only.\n\
         2. Produce natural {target} sentences.\n\
         3. Use the glossary translation for every glossary term.\n\
         4. Keep sentences that continue each other coherent.\n\
         5. Keep the leading number marker [1], [2], [3]... of every sentence.\n\
         6. Output only the translations, with no explanations or notes.\n\
         \n\
         ## Sentences to translate\n\
         {numbered}\n\
         \n\
         ## Output format (keep the numbers)\n\
         [1] {target} translation of the first sentence\n\
         [2] {target} translation of the second sentence\n\
         ...\n\
         \n\
         Start translating:",
        domain = context.domain,
        topic = topic,
        source = source,
        target = target,
        tone = context.tone.as_str(),
        glossary = glossary,
        numbered = numbered,
    )
}

/// Map `[n] text` markers of a reply to their text.
///
/// Text runs to the next marker or the end of the reply. Blank texts are
/// dropped so the sentence falls back to its source.
pub fn parse_numbered_reply(reply: &str) -> HashMap<usize, String> {
    let markers: Vec<(usize, usize, Option<usize>)> = INDEX_MARKER
        .captures_iter(reply)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let number = caps.get(1).and_then(|m| m.as_str().parse().ok());
            Some((whole.start(), whole.end(), number))
        })
        .collect();

    let mut translations = HashMap::new();
    for (i, (_, text_start, number)) in markers.iter().enumerate() {
        let text_end = markers.get(i + 1).map_or(reply.len(), |next| next.0);
        let text = reply[*text_start..text_end].trim();
        if let Some(number) = number {
            if !text.is_empty() {
                translations.insert(*number, text.to_string());
            }
        }
    }

    translations
}

/// Attach each sentence's translation to the timing of its fragments.
///
/// `None` means the chunk could not be translated: every span keeps its source
/// text. A missing index falls back to the sentence text.
pub fn remap(
    chunk: &[MergedSentence],
    translations: Option<&HashMap<usize, String>>,
    fragments: &[Fragment],
) -> Result<Vec<TranslatedSegment>> {
    let mut segments = Vec::with_capacity(chunk.len());

    for (i, sentence) in chunk.iter().enumerate() {
        let sources = sentence
            .fragment_indices
            .iter()
            .map(|&index| {
                fragments.get(index).ok_or_else(|| {
                    CaytError::Translation(format!(
                        "sentence \"{}\" references fragment {} of {}",
                        sentence.text, index, fragments.len()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let (first, last) = match (sources.first(), sources.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => {
                return Err(CaytError::Translation(format!(
                    "sentence \"{}\" has no fragments", sentence.text
                )));
            }
        };

        let source_text = if sources.len() == 1 {
            first.text.clone()
        } else {
            sources.iter().map(|f| f.text.as_str()).collect::<Vec<_>>().join(" ")
        };

        let translated_text = match translations {
            None => source_text.clone(),
            Some(map) => map
                .get(&(i + 1))
                .cloned()
                .unwrap_or_else(|| sentence.text.clone()),
        };

        segments.push(TranslatedSegment {
            start: first.start,
            end: last.end,
            source_text,
            translated_text,
        });
    }

    Ok(segments)
}
