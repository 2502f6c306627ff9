//! Cayt - Context-Aware Transcript Translator
//!
//! Turns timestamped transcripts into timestamp-aligned translations through
//! context analysis, sentence reassembly, chunked LLM translation and an
//! optional localization pass, backed by an Ollama completion service.

pub mod cache;
pub mod cancel;
pub mod cli;
pub mod completion;
pub mod config;
pub mod context;
pub mod error;
pub mod language;
pub mod source;
pub mod subtitle;
pub mod translate;
pub mod workflow;
