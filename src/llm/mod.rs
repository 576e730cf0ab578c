//! Language model backends
//!
//! One chat-style call per classification attempt: a fixed system role plus
//! the rendered prompt as user content. No streaming.

use crate::config::{ClassifierConfig, ModelProvider};
use crate::error::ClassifierError;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub mod gemini;
pub mod ollama;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;

/// Trait for chat-style model invocation
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    /// Send one system + user exchange and return the raw reply text
    async fn chat(&self, system: &str, user: &str) -> Result<String>;
}

/// Build the backend selected by configuration
pub fn from_config(config: &ClassifierConfig) -> Result<Arc<dyn LanguageModel>> {
    let model: Arc<dyn LanguageModel> = match &config.provider {
        ModelProvider::Ollama { host } => Arc::new(OllamaClient::new(
            host.clone(),
            config.model.clone(),
            config.model_timeout,
        )?),
        ModelProvider::Gemini { api_key, base_url } => Arc::new(GeminiClient::new(
            api_key.clone(),
            base_url.clone(),
            config.model.clone(),
            config.model_timeout,
        )?),
    };
    Ok(model)
}

/// Scripted model for development & testing.
/// Replies are consumed in order; an exhausted script fails the call.
#[derive(Default)]
pub struct MockLanguageModel {
    replies: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockLanguageModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()));
        self
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(Err(ClassifierError::ModelError(message.into())));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// User prompts received so far, oldest first
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    fn push(&self, reply: Result<String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(&self, _system: &str, user: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(user.to_string());
        }

        self.replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front())
            .unwrap_or_else(|| {
                Err(ClassifierError::ModelError(
                    "mock model has no scripted reply".to_string(),
                ))
            })
    }
}
