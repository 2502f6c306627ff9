// Sentence-level translation pipeline
//
// - sentence: fragment to sentence reassembly
// - engine: chunked numbered-prompt translation with timecode remapping
// - refiner: optional neighbour-aware localization pass

pub mod engine;
pub mod refiner;
pub mod sentence;

use serde::{Deserialize, Serialize};

pub use engine::TranslationEngine;
pub use refiner::LocalizationRefiner;
pub use sentence::merge;

/// Consecutive fragments that form one sentence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedSentence {
    pub text: String,
    /// Indices into the fragment list, non-empty and ascending
    pub fragment_indices: Vec<usize>,
    pub start: f64,
    pub end: f64,
}

/// One translated span carrying the timing of its source fragments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslatedSegment {
    pub start: f64,
    pub end: f64,
    pub source_text: String,
    pub translated_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinedSegment {
    pub start: f64,
    pub end: f64,
    pub source_text: String,
    pub initial_text: String,
    pub refined_text: String,
}

impl From<RefinedSegment> for TranslatedSegment {
    fn from(segment: RefinedSegment) -> Self {
        Self {
            start: segment.start,
            end: segment.end,
            source_text: segment.source_text,
            translated_text: segment.refined_text,
        }
    }
}

/// Items produced by a stage, and whether it stopped on cancellation
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput<T> {
    pub items: Vec<T>,
    pub cancelled: bool,
}

impl<T> StageOutput<T> {
    pub fn completed(items: Vec<T>) -> Self {
        Self { items, cancelled: false }
    }

    pub fn cancelled(items: Vec<T>) -> Self {
        Self { items, cancelled: true }
    }
}
