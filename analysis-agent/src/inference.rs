//! Inference service client
//!
//! Requests carry a model id, one user-role prompt and temperature 0 for
//! deterministic decoding. Every call is bounded by a request timeout.

use async_trait::async_trait;
use common::config::InferenceConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference request timed out after {0:?}")]
    Timeout(Duration),

    #[error("inference transport error: {0}")]
    Transport(String),

    #[error("inference service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("inference response could not be decoded: {0}")]
    Decode(String),
}

/// Black-box text completion used by the classification stages
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, InferenceError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

/// Ollama-compatible `POST /api/chat` body
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

/// Client for an Ollama-compatible chat endpoint
pub struct OllamaClient {
    http: Client,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(config: &InferenceConfig) -> Result<Self, InferenceError> {
        let timeout = config.timeout();
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{}/api/chat", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request<'a>(&'a self, prompt: &str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: false,
            options: ChatOptions { temperature: 0.0 },
        }
    }

    fn map_error(&self, e: reqwest::Error) -> InferenceError {
        if e.is_timeout() {
            InferenceError::Timeout(self.timeout)
        } else if e.is_decode() {
            InferenceError::Decode(e.to_string())
        } else {
            InferenceError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String, InferenceError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&self.request(prompt))
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response.json().await.map_err(|e| self.map_error(e))?;
        debug!(model = %self.model, chars = chat.message.content.len(), "Inference complete");

        Ok(chat.message.content.trim().to_string())
    }
}
