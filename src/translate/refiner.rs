use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::completion::{CompletionPool, CompletionRequest, SamplingOptions};
use crate::config::RefineConfig;
use crate::language::LanguagePair;
use super::{RefinedSegment, StageOutput, TranslatedSegment};

const REFINE_TEMPERATURE: f32 = 0.7;
const REFINE_TOP_P: f32 = 0.9;

static NUMBERED_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:Subtitle\s*)?#?(\d+)[\.\):\s]+(.+)$").expect("numbered line pattern is valid")
});

const METADATA_MARKERS: [&str; 5] = ["context:", "original", "translation", "refine", "subtitle"];

/// One segment of a batch with its neighbours
struct BatchEntry<'a> {
    current: &'a TranslatedSegment,
    previous: Option<&'a TranslatedSegment>,
    next: Option<&'a TranslatedSegment>,
}

/// Second pass that rewrites first-pass translations for native fluency
pub struct LocalizationRefiner {
    pool: CompletionPool,
    config: RefineConfig,
}

impl LocalizationRefiner {
    pub fn new(pool: CompletionPool, config: RefineConfig) -> Self {
        Self { pool, config }
    }

    /// Refine `segments` in batches, checking `cancel` before each batch.
    /// Segments the model does not answer for keep their first-pass text.
    pub async fn refine(
        &self,
        segments: &[TranslatedSegment],
        languages: &LanguagePair,
        cancel: &CancelToken,
    ) -> StageOutput<RefinedSegment> {
        let batch_size = self.config.batch_size.max(1);
        let system_prompt = localizer_system_prompt(&languages.target_name());
        let mut refined = Vec::with_capacity(segments.len());

        for batch_start in (0..segments.len()).step_by(batch_size) {
            if cancel.is_cancelled() {
                info!("Refinement cancelled at segment {}/{}", batch_start, segments.len());
                return StageOutput::cancelled(refined);
            }

            let batch_end = (batch_start + batch_size).min(segments.len());
            let entries: Vec<BatchEntry> = (batch_start..batch_end)
                .map(|index| BatchEntry {
                    current: &segments[index],
                    previous: index.checked_sub(1).map(|prev| &segments[prev]),
                    next: segments.get(index + 1),
                })
                .collect();

            info!("Refining segments {}-{}/{}", batch_start + 1, batch_end, segments.len());
            let texts = self.refine_batch(&entries, &system_prompt, languages).await;

            for (entry, text) in entries.iter().zip(texts) {
                let refined_text = if text.trim().is_empty() {
                    entry.current.translated_text.clone()
                } else {
                    text
                };
                refined.push(RefinedSegment {
                    start: entry.current.start,
                    end: entry.current.end,
                    source_text: entry.current.source_text.clone(),
                    initial_text: entry.current.translated_text.clone(),
                    refined_text,
                });
            }
        }

        StageOutput::completed(refined)
    }

    async fn refine_batch(&self, entries: &[BatchEntry<'_>], system_prompt: &str, languages: &LanguagePair) -> Vec<String> {
        let fallback: Vec<String> = entries.iter().map(|e| e.current.translated_text.clone()).collect();
        let request = CompletionRequest::new(
            build_batch_prompt(entries, languages),
            SamplingOptions::with_temperature(REFINE_TEMPERATURE).top_p(REFINE_TOP_P),
        )
        .with_system(system_prompt);

        let max_attempts = self.config.max_retries.max(1);
        for attempt in 1..=max_attempts {
            match self.pool.complete(request.clone()).await {
                Ok(reply) => {
                    debug!("Refinement reply: {}", reply);
                    return parse_batch_reply(&reply, &fallback);
                }
                Err(e) => {
                    warn!("Refinement attempt {}/{} failed: {}", attempt, max_attempts, e);
                    if attempt < max_attempts {
                        tokio::time::sleep(std::time::Duration::from_millis(self.config.retry_delay_ms)).await;
                    }
                }
            }
        }

        fallback
    }
}

fn localizer_system_prompt(target: &str) -> String {
    format!(
        "You are a {target} localization specialist.\n\
         \n\
         Your role is to refine machine-translated {target} subtitles so they sound natural and fluent to native {target} speakers.\n\
         \n\
         ## Guidelines:\n\
         1. PRESERVE the original meaning accurately\n\
         2. USE natural expressions that native {target} speakers would use\n\
         3. CONSIDER the previous and next subtitles for consistency\n\
         4. MAINTAIN one speech register consistently\n\
         5. ADAPT cultural references when necessary\n\
         6. KEEP the translation concise for subtitle readability\n\
         \n\
         ## Output:\n\
         - One refined {target} line per subtitle, numbered like `#1: text`\n\
         - No explanations or notes",
        target = target
    )
}

fn build_batch_prompt(entries: &[BatchEntry<'_>], languages: &LanguagePair) -> String {
    let source = languages.source_name();
    let target = languages.target_name();
    let mut parts = Vec::with_capacity(entries.len());

    for (i, entry) in entries.iter().enumerate() {
        let mut context = Vec::new();
        if let Some(previous) = entry.previous {
            context.push(format!("[Previous] {}\n         -> {}", previous.source_text, previous.translated_text));
        }
        if let Some(next) = entry.next {
            context.push(format!("[Next] {}\n     -> {}", next.source_text, next.translated_text));
        }
        let context_block = if context.is_empty() {
            "(No context available)".to_string()
        } else {
            context.join("\n")
        };

        parts.push(format!(
            "---\n\
             Subtitle #{number}\n\
             \n\
             Context:\n\
             {context_block}\n\
             \n\
             [Original {source}]\n\
             {original}\n\
             \n\
             [Initial {target} Translation]\n\
             {initial}\n\
             \n\
             Refine the {target} translation to be more natural:",
            number = i + 1,
            context_block = context_block,
            source = source,
            target = target,
            original = entry.current.source_text,
            initial = entry.current.translated_text,
        ));
    }

    parts.join("\n\n")
}

/// Split a batch reply into one text per segment.
///
/// Numbered lines (`#2: text`, `2. text`, `Subtitle 2: text`) go to their
/// slot; other non-metadata lines fill the next unresolved slot in order.
/// Slots left empty take the matching `fallback` text.
pub fn parse_batch_reply(reply: &str, fallback: &[String]) -> Vec<String> {
    let count = fallback.len();
    let mut results = vec![String::new(); count];
    let mut cursor = 0;

    for raw in reply.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with("---") || line.starts_with('[') {
            continue;
        }

        if let Some(caps) = NUMBERED_LINE.captures(line) {
            let slot = caps[1].parse::<usize>().ok().and_then(|n| n.checked_sub(1));
            if let Some(slot) = slot.filter(|&s| s < count) {
                results[slot] = caps[2].trim().to_string();
            }
            continue;
        }

        let lowered = line.to_lowercase();
        if METADATA_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            continue;
        }

        while cursor < count && !results[cursor].is_empty() {
            cursor += 1;
        }
        if cursor < count {
            results[cursor] = line.to_string();
            cursor += 1;
        }
    }

    results
        .into_iter()
        .zip(fallback)
        .map(|(text, fallback)| if text.is_empty() { fallback.clone() } else { text })
        .collect()
}
