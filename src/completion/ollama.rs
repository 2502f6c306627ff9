use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::CompletionConfig;
use crate::error::{Result, CaytError};
use super::{CompletionRequest, CompletionService, SamplingOptions};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: SamplingOptions,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Clone, Deserialize)]
struct ModelTag {
    name: String,
}

/// Ollama chat API client
pub struct OllamaClient {
    client: Client,
    config: CompletionConfig,
}

impl OllamaClient {
    pub fn new(config: CompletionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(CaytError::Http)?;

        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    fn build_messages(request: &CompletionRequest) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.user_prompt.clone(),
        });
        messages
    }
}

#[async_trait]
impl CompletionService for OllamaClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let url = self.url("api/chat");
        let body = ChatRequest {
            model: &self.config.model,
            messages: Self::build_messages(&request),
            stream: false,
            options: request.sampling,
        };

        debug!("Sending completion request to: {}", url);

        let response = self.client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CaytError::Completion(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(CaytError::Completion(format!(
                "Ollama API error {}: {}", status, error_text
            )));
        }

        let chat: ChatResponse = response.json().await
            .map_err(|e| CaytError::Completion(format!("Failed to parse response: {}", e)))?;

        let content = chat.message.content;
        debug!("Completion reply: {} chars", content.len());

        if content.trim().is_empty() {
            return Err(CaytError::Completion("Empty completion received".to_string()));
        }

        Ok(content)
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let response = self.client
            .get(self.url("api/tags"))
            .send()
            .await
            .map_err(|e| CaytError::Unreachable(format!("Failed to connect to Ollama: {}", e)))?;

        if !response.status().is_success() {
            return Err(CaytError::Completion(format!(
                "Listing models failed with status {}", response.status()
            )));
        }

        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn check_reachable(&self) -> bool {
        match self.client.get(self.url("api/tags")).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Ollama not reachable at {}: {}", self.config.endpoint, e);
                false
            }
        }
    }
}
