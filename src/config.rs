//! Process configuration
//!
//! Resolved once at start-up from the environment (after `.env` is loaded)
//! and passed into constructors. Nothing reads the environment per request.

use crate::error::ClassifierError;
use crate::Result;
use std::env;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "llama3";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_SEARCH_ENDPOINT: &str = "https://api.search.brave.com";
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PORT: u16 = 8080;

/// Which chat backend answers classification prompts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelProvider {
    Ollama { host: String },
    Gemini { api_key: String, base_url: String },
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub enabled: bool,
    pub provider: ModelProvider,
    pub model: String,
    pub model_timeout: Duration,
    pub search_endpoint: String,
    pub search_api_key: Option<String>,
    pub search_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub database_url: Option<String>,
}

impl ClassifierConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let enabled = match get("CLASSIFIER_ENABLED") {
            Some(value) => parse_flag("CLASSIFIER_ENABLED", &value)?,
            None => true,
        };

        let provider_name = get("LLM_PROVIDER").unwrap_or_else(|| "ollama".to_string());
        let (provider, default_model) = match provider_name.to_lowercase().as_str() {
            "ollama" => (
                ModelProvider::Ollama {
                    host: trim_url(get("OLLAMA_HOST").unwrap_or_else(|| DEFAULT_OLLAMA_HOST.into())),
                },
                DEFAULT_OLLAMA_MODEL,
            ),
            "gemini" => {
                let api_key = get("GEMINI_API_KEY").ok_or_else(|| {
                    ClassifierError::ConfigError(
                        "GEMINI_API_KEY is required when LLM_PROVIDER=gemini".to_string(),
                    )
                })?;
                (
                    ModelProvider::Gemini {
                        api_key,
                        base_url: trim_url(
                            get("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.into()),
                        ),
                    },
                    DEFAULT_GEMINI_MODEL,
                )
            }
            other => {
                return Err(ClassifierError::ConfigError(format!(
                    "Unknown LLM_PROVIDER '{}' (expected ollama or gemini)",
                    other
                )))
            }
        };

        Ok(Self {
            enabled,
            provider,
            model: get("LLM_MODEL").unwrap_or_else(|| default_model.to_string()),
            model_timeout: parse_secs(
                "LLM_TIMEOUT_SECS",
                get("LLM_TIMEOUT_SECS"),
                DEFAULT_LLM_TIMEOUT_SECS,
            )?,
            search_endpoint: trim_url(
                get("SEARCH_ENDPOINT").unwrap_or_else(|| DEFAULT_SEARCH_ENDPOINT.into()),
            ),
            search_api_key: get("BRAVE_SEARCH_API_KEY"),
            search_timeout: parse_secs(
                "SEARCH_TIMEOUT_SECS",
                get("SEARCH_TIMEOUT_SECS"),
                DEFAULT_SEARCH_TIMEOUT_SECS,
            )?,
        })
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT").or_else(|| get("API_PORT")) {
            Some(raw) => raw.trim().parse().map_err(|_| {
                ClassifierError::ConfigError(format!("PORT must be a port number, got '{}'", raw))
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            port,
            database_url: get("DATABASE_URL").or_else(|| get("POSTGRES_URL")),
        })
    }
}

/// Log filter from `RUST_LOG`, else `default`. Call after `.env` is loaded.
pub fn log_filter(default: &str) -> EnvFilter {
    log_filter_from(env::var("RUST_LOG").ok(), default)
}

fn log_filter_from(directives: Option<String>, default: &str) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(default))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ClassifierError::ConfigError(format!(
            "{} must be a boolean, got '{}'",
            key, value
        ))),
    }
}

fn parse_secs(key: &str, value: Option<String>, default: u64) -> Result<Duration> {
    let secs = match value {
        Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
            ClassifierError::ConfigError(format!("{} must be whole seconds, got '{}'", key, raw))
        })?,
        None => default,
    };

    if secs == 0 {
        return Err(ClassifierError::ConfigError(format!(
            "{} must be greater than zero",
            key
        )));
    }

    Ok(Duration::from_secs(secs))
}

fn trim_url(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}
