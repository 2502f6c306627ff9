// Text completion service abstraction
//
// Every LLM interaction in the pipeline goes through `CompletionService`:
// - OllamaClient: HTTP client for a local or remote Ollama server
// - CompletionPool: bounded worker pool that every call is submitted to

pub mod ollama;
pub mod pool;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use ollama::OllamaClient;
pub use pool::CompletionPool;
use crate::config::CompletionConfig;
use crate::error::Result;

/// Sampling parameters forwarded to the model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingOptions {
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

impl SamplingOptions {
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature,
            top_p: None,
        }
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }
}

/// One request/response round with the completion service
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: Option<String>,
    pub user_prompt: String,
    pub sampling: SamplingOptions,
}

impl CompletionRequest {
    pub fn new(user_prompt: impl Into<String>, sampling: SamplingOptions) -> Self {
        Self {
            system_prompt: None,
            user_prompt: user_prompt.into(),
            sampling,
        }
    }

    pub fn with_system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

/// Main trait for LLM completion operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Send one prompt and return the free-form reply text
    async fn complete(&self, request: CompletionRequest) -> Result<String>;

    /// List model identifiers known to the service
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Check whether the service answers at all
    async fn check_reachable(&self) -> bool;
}

/// Factory for creating completion service instances
pub struct CompletionServiceFactory;

impl CompletionServiceFactory {
    /// Create the default completion service (Ollama)
    pub fn create_default(config: CompletionConfig) -> Result<Arc<dyn CompletionService>> {
        Ok(Arc::new(OllamaClient::new(config)?))
    }
}
