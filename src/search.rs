//! Web enrichment lookup
//!
//! Best-effort context about a transaction, used only when the first model
//! attempt is not confident. A failed lookup yields an empty context and
//! never blocks classification.

use crate::error::ClassifierError;
use crate::models::ClassificationRequest;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Results requested per lookup
pub const MAX_SEARCH_RESULTS: usize = 3;

/// Upper bound on context handed to the model, in characters
pub const MAX_CONTEXT_CHARS: usize = 1000;

/// One web result; only its snippet feeds the model
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub body: String,
}

impl SearchHit {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

/// Trait for text search providers
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;
}

/// Wraps a provider and collapses its failures into an empty context
#[derive(Clone)]
pub struct WebEnrichment {
    provider: Arc<dyn SearchProvider>,
}

impl WebEnrichment {
    pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
        Self { provider }
    }

    /// Contextual text for the request, possibly empty. Never fails.
    pub async fn lookup(&self, request: &ClassificationRequest) -> String {
        let query = build_query(request);

        match self.try_lookup(&query).await {
            Ok(context) => {
                debug!(
                    provider = self.provider.name(),
                    chars = context.chars().count(),
                    "Web context retrieved"
                );
                context
            }
            Err(e) => {
                warn!(provider = self.provider.name(), "Web search error: {}", e);
                String::new()
            }
        }
    }

    async fn try_lookup(&self, query: &str) -> Result<String> {
        let hits = self.provider.search(query, MAX_SEARCH_RESULTS).await?;

        let joined = hits
            .iter()
            .take(MAX_SEARCH_RESULTS)
            .map(|h| h.body.trim())
            .filter(|b| !b.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        Ok(truncate_chars(&joined, MAX_CONTEXT_CHARS).to_string())
    }
}

/// Description, followed by the merchant when one is known
pub fn build_query(request: &ClassificationRequest) -> String {
    match request.merchant() {
        Some(company) => format!("{} {}", request.description.trim(), company),
        None => request.description.trim().to_string(),
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// =============================
// Brave Search
// =============================

/// Brave web search API (`/res/v1/web/search`)
pub struct BraveSearch {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl BraveSearch {
    /// Without a key every search fails fast, which leaves the context empty
    pub fn new(endpoint: String, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(4)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl SearchProvider for BraveSearch {
    fn name(&self) -> &str {
        "brave"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ClassifierError::SearchError("BRAVE_SEARCH_API_KEY is not set".to_string())
        })?;

        let url = format!("{}/res/v1/web/search", self.endpoint);
        let count = max_results.to_string();

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", api_key)
            .query(&[
                ("q", query),
                ("count", count.as_str()),
                ("text_decorations", "false"),
            ])
            .send()
            .await
            .map_err(|e| ClassifierError::SearchError(format!("Brave request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ClassifierError::SearchError(format!(
                "Brave returned {}: {}",
                status, error_text
            )));
        }

        let results: BraveResponse = response.json().await.map_err(|e| {
            ClassifierError::SearchError(format!("Failed to parse Brave response: {}", e))
        })?;

        let hits = results.into_hits(max_results);
        if hits.is_empty() {
            return Err(ClassifierError::SearchError(format!(
                "No results for '{}'",
                query
            )));
        }

        Ok(hits)
    }
}

#[derive(Debug, Default, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<WebResults>,
}

#[derive(Debug, Default, Deserialize)]
struct WebResults {
    #[serde(default)]
    results: Vec<WebResult>,
}

#[derive(Debug, Deserialize)]
struct WebResult {
    #[serde(default)]
    description: Option<String>,
}

impl BraveResponse {
    fn into_hits(self, max_results: usize) -> Vec<SearchHit> {
        self.web
            .map(|web| web.results)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| r.description)
            .filter(|d| !d.trim().is_empty())
            .take(max_results)
            .map(SearchHit::new)
            .collect()
    }
}

// =============================
// Mock
// =============================

/// Scripted search provider for development & testing
pub struct MockSearch {
    outcome: std::result::Result<Vec<SearchHit>, String>,
    queries: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockSearch {
    pub fn with_hits(hits: Vec<SearchHit>) -> Self {
        Self {
            outcome: Ok(hits),
            queries: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            outcome: Err(message.into()),
            queries: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .map(|q| q.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }

        match &self.outcome {
            Ok(hits) => Ok(hits.iter().take(max_results).cloned().collect()),
            Err(message) => Err(ClassifierError::SearchError(message.clone())),
        }
    }
}
