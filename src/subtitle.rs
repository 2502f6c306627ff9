use std::path::Path;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use crate::error::{Result, CaytError};
use crate::translate::TranslatedSegment;

/// Adjacent fragments with identical text closer than this are folded together
pub const DUPLICATE_GAP_SECS: f64 = 0.5;

static CUE_TIMING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2}:)?(\d{2}):(\d{2})[.,](\d{3})\s*-->\s*(\d{1,2}:)?(\d{2}):(\d{2})[.,](\d{3})")
        .expect("cue timing pattern is valid")
});

static INLINE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("tag pattern is valid"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Atomic timestamped unit of source text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Fragment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Space-joined text of every fragment, used for context analysis
pub fn full_text(fragments: &[Fragment]) -> String {
    fragments
        .iter()
        .map(|f| f.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a cue timestamp (`HH:MM:SS.mmm`, `MM:SS.mmm`, comma separators allowed) into seconds
pub fn parse_timestamp(timestamp: &str) -> f64 {
    let normalized = timestamp.trim().replace(',', ".");
    let parts: Vec<&str> = normalized.split(':').collect();

    let parsed = match parts.as_slice() {
        [hours, minutes, seconds] => hours.parse::<u64>().ok().and_then(|h| {
            let m = minutes.parse::<u64>().ok()?;
            let s = seconds.parse::<f64>().ok()?;
            Some((h * 3600 + m * 60) as f64 + s)
        }),
        [minutes, seconds] => minutes.parse::<u64>().ok().and_then(|m| {
            let s = seconds.parse::<f64>().ok()?;
            Some((m * 60) as f64 + s)
        }),
        _ => None,
    };

    parsed.unwrap_or(0.0)
}

/// Collapse runs of whitespace and trim
pub fn clean_text(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Parse WebVTT or SRT cue text into fragments.
///
/// Cue identifiers, the `WEBVTT` header, positional settings after the end
/// timestamp and inline tags such as `<c>` or `<00:00:02.500>` are dropped.
/// Cues whose text is empty after cleanup are skipped.
pub fn parse_cues(content: &str) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    let mut lines: Vec<&str> = content.trim().lines().collect();

    if let Some(header) = lines.iter().position(|l| l.trim().to_uppercase().starts_with("WEBVTT")) {
        lines.drain(..=header);
    }

    let mut current: Option<(f64, f64)> = None;
    let mut text_lines: Vec<&str> = Vec::new();

    for raw in lines {
        let line = raw.trim();

        if line.is_empty() {
            flush_cue(&mut current, &mut text_lines, &mut fragments);
            continue;
        }

        if line.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }

        if CUE_TIMING.is_match(line) {
            if let Some((start_part, end_part)) = line.split_once("-->") {
                let end_token = end_part.split_whitespace().next().unwrap_or("");
                current = Some((parse_timestamp(start_part), parse_timestamp(end_token)));
                text_lines.clear();
            }
            continue;
        }

        if current.is_some() {
            text_lines.push(line);
        }
    }

    flush_cue(&mut current, &mut text_lines, &mut fragments);
    fragments
}

fn flush_cue(current: &mut Option<(f64, f64)>, text_lines: &mut Vec<&str>, out: &mut Vec<Fragment>) {
    if let Some((start, end)) = current.take() {
        let joined = text_lines.join(" ");
        let text = clean_text(&INLINE_TAG.replace_all(&joined, ""));
        if !text.is_empty() {
            out.push(Fragment::new(start, end, text));
        }
    }
    text_lines.clear();
}

/// Fold adjacent fragments that repeat the same text across a gap shorter than
/// [`DUPLICATE_GAP_SECS`], as auto-generated captions often do.
pub fn merge_duplicate_fragments(fragments: Vec<Fragment>) -> Vec<Fragment> {
    let mut merged: Vec<Fragment> = Vec::with_capacity(fragments.len());

    for fragment in fragments {
        match merged.last_mut() {
            Some(last) if last.text == fragment.text && (fragment.start - last.end).abs() < DUPLICATE_GAP_SECS => {
                last.end = fragment.end;
            }
            _ => merged.push(fragment),
        }
    }

    merged
}

/// Render translated segments as SRT text
pub fn render_srt(segments: &[TranslatedSegment]) -> String {
    let mut srt_content = String::new();

    for (index, segment) in segments.iter().enumerate() {
        srt_content.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            index + 1,
            format_srt_time(segment.start),
            format_srt_time(segment.end),
            segment.translated_text.trim()
        ));
    }

    srt_content
}

/// Generate SRT subtitle file from translated segments
pub async fn generate_srt<P: AsRef<Path>>(
    segments: &[TranslatedSegment],
    output_path: P,
) -> Result<()> {
    let output_path = output_path.as_ref();
    info!("Generating SRT file: {}", output_path.display());

    fs::write(output_path, render_srt(segments)).await
        .map_err(CaytError::Io)?;

    info!("SRT file generated successfully ({} cues)", segments.len());
    Ok(())
}

/// Format time in seconds to SRT time format (HH:MM:SS,mmm)
fn format_srt_time(seconds: f64) -> String {
    let total_milliseconds = (seconds * 1000.0).round() as u64;
    let hours = total_milliseconds / 3_600_000;
    let minutes = (total_milliseconds % 3_600_000) / 60_000;
    let secs = (total_milliseconds % 60_000) / 1_000;
    let millis = total_milliseconds % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}
