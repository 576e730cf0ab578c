//! Ollama chat client
//!
//! Talks to a local or remote Ollama server over `/api/chat`.
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::error::ClassifierError;
use crate::llm::LanguageModel;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Reusable Ollama client (connection-pooled)
pub struct OllamaClient {
    client: Client,
    host: String,
    model: String,
}

impl OllamaClient {
    pub fn new(host: String, model: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            model,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.host);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
            stream: false,
            options: Options { temperature: 0.0 },
        };

        debug!(model = %self.model, "Calling Ollama chat API");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Ollama request failed: {}", e);
                ClassifierError::ModelError(format!("Ollama request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Ollama error response ({}): {}", status, error_text);
            return Err(ClassifierError::ModelError(format!(
                "Ollama returned {}: {}",
                status, error_text
            )));
        }

        let reply: ChatResponse = response.json().await.map_err(|e| {
            ClassifierError::ModelError(format!("Ollama parse error: {}", e))
        })?;

        let content = reply
            .message
            .map(|m| m.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ClassifierError::ModelError("Empty response from Ollama".to_string()))?;

        Ok(content)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    stream: bool,
    options: Options,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ReplyMessage>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = ChatRequest {
            model: "llama3",
            messages: vec![
                Message {
                    role: "system",
                    content: "You classify expenses",
                },
                Message {
                    role: "user",
                    content: "Description: Big Mac",
                },
            ],
            stream: false,
            options: Options { temperature: 0.0 },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "llama3");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Description: Big Mac");
    }

    #[test]
    fn test_response_parsing_ignores_extra_fields() {
        let raw = r#"{"model":"llama3","created_at":"2024-01-01T00:00:00Z",
            "message":{"role":"assistant","content":"{\"category\":\"HOME\"}"},
            "done":true,"total_duration":12345}"#;
        let reply: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(reply.message.unwrap().content, r#"{"category":"HOME"}"#);
    }
}
