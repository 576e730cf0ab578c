//! Model query adapter
//!
//! Renders the classification prompt, calls the language model and turns
//! its free-text reply into a [`ClassificationCandidate`]. Models tend to
//! wrap JSON in conversational padding, so the reply is mined for the first
//! brace-delimited object rather than parsed whole.
//!
//! `ask` never fails: every error path degrades to OTHER/OTHER/0.0.

use crate::error::ClassifierError;
use crate::llm::LanguageModel;
use crate::models::{ClassificationCandidate, ClassificationRequest};
use crate::taxonomy;
use crate::Result;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

pub const SYSTEM_INSTRUCTION: &str =
    "You classify college-related expenses into predefined categories.";

/// Keys a model may volunteer that must never reach the candidate
const MERCHANT_KEYS: &[&str] = &["company", "merchant", "vendor", "vendor_name"];

/// What the model is asked about on one attempt
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub request: &'a ClassificationRequest,
    /// Web context for the re-evaluation attempt; `None` on the first ask
    pub web_context: Option<&'a str>,
}

impl<'a> PromptContext<'a> {
    pub fn direct(request: &'a ClassificationRequest) -> Self {
        Self {
            request,
            web_context: None,
        }
    }

    pub fn enriched(request: &'a ClassificationRequest, web_context: &'a str) -> Self {
        Self {
            request,
            web_context: Some(web_context),
        }
    }

    pub fn render(&self) -> String {
        let request = self.request;
        let company = request.merchant().unwrap_or("Unknown");

        match self.web_context {
            None => format!(
                r#"You are an expense classification assistant for college students.
{schema}
Respond strictly in valid JSON format like this:
{{ "category": string, "subcategory": string, "confidence": number }}

Description: {description}
Amount: {amount}
Company: {company}
Category and subcategory must match one of the above options exactly.
Confidence is a number between 0.0 and 1.0."#,
                schema = taxonomy::schema_description(),
                description = request.description.trim(),
                amount = request.amount,
                company = company,
            ),
            Some(context) => format!(
                r#"{schema}
Transaction: {description}
Amount: {amount}
Company: {company}
Context from web: {context}

Re-evaluate and respond strictly in JSON format with keys category, subcategory, and confidence (0.0-1.0).
Category and subcategory must match one of the above options exactly."#,
                schema = taxonomy::schema_description(),
                description = request.description.trim(),
                amount = request.amount,
                company = company,
                context = if context.trim().is_empty() {
                    "(none)"
                } else {
                    context
                },
            ),
        }
    }
}

/// Wraps a language model with prompt rendering and reply repair
#[derive(Clone)]
pub struct ModelQueryAdapter {
    model: Arc<dyn LanguageModel>,
}

impl ModelQueryAdapter {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// One classification attempt. Never fails.
    pub async fn ask(&self, context: PromptContext<'_>) -> ClassificationCandidate {
        match self.try_ask(context).await {
            Ok(candidate) => candidate,
            Err(ClassifierError::ExtractionError(reason)) => {
                warn!(model = self.model.name(), "No usable JSON in model output: {}", reason);
                ClassificationCandidate::fallback()
            }
            Err(e) => {
                error!(model = self.model.name(), "Model classification error: {}", e);
                ClassificationCandidate::fallback()
            }
        }
    }

    async fn try_ask(&self, context: PromptContext<'_>) -> Result<ClassificationCandidate> {
        let prompt = context.render();
        let reply = self.model.chat(SYSTEM_INSTRUCTION, &prompt).await?;

        debug!(
            model = self.model.name(),
            reply_chars = reply.len(),
            "Model reply received"
        );

        parse_candidate(&reply)
    }
}

/// Greedy slice from the first `{` to the last `}`
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

/// Turn raw model text into a candidate with every field defaulted
pub fn parse_candidate(reply: &str) -> Result<ClassificationCandidate> {
    let mut object = parse_object(reply)?;

    for key in MERCHANT_KEYS {
        object.remove(*key);
    }

    let category = object.get("category").and_then(Value::as_str);
    let subcategory = object.get("subcategory").and_then(Value::as_str);
    let confidence = object
        .get("confidence")
        .and_then(read_confidence)
        .unwrap_or(0.0);

    let entry = taxonomy::resolve(category, subcategory);

    Ok(ClassificationCandidate::new(entry, confidence))
}

fn parse_object(reply: &str) -> Result<Map<String, Value>> {
    let preview = || reply.chars().take(100).collect::<String>();

    let block = extract_json_object(reply)
        .ok_or_else(|| ClassifierError::ExtractionError(format!("no JSON in '{}'", preview())))?;

    // The greedy slice breaks when the reply holds more than one object;
    // fall back to the first complete object.
    let value = match serde_json::from_str::<Value>(block) {
        Ok(value) => value,
        Err(_) => serde_json::Deserializer::from_str(block)
            .into_iter::<Value>()
            .next()
            .and_then(|v| v.ok())
            .ok_or_else(|| {
                ClassifierError::ExtractionError(format!("unparseable JSON in '{}'", preview()))
            })?,
    };

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ClassifierError::ExtractionError(format!(
            "JSON is not an object in '{}'",
            preview()
        ))),
    }
}

fn read_confidence(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok().map(|v| {
            if s.trim().ends_with('%') {
                v / 100.0
            } else {
                v
            }
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLanguageModel;
    use crate::taxonomy::Category;

    #[test]
    fn test_json_embedded_in_prose() {
        let reply = r#"Sure! Here you go: {"category":"HOME","subcategory":"Rent","confidence":0.9} Thanks!"#;
        let candidate = parse_candidate(reply).unwrap();

        assert_eq!(candidate.category, Category::Home);
        assert_eq!(candidate.subcategory, "Rent");
        assert_eq!(candidate.confidence, 0.9);
    }

    #[test]
    fn test_json_across_newlines_in_fence() {
        let reply = "```json\n{\n  \"category\": \"TRANSPORTATION\",\n  \"subcategory\": \"Gas\",\n  \"confidence\": 0.75\n}\n```";
        let candidate = parse_candidate(reply).unwrap();

        assert_eq!(candidate.category, Category::Transportation);
        assert_eq!(candidate.subcategory, "Gas");
    }

    #[test]
    fn test_plain_prose_is_extraction_error() {
        let err = parse_candidate("I am not sure what this expense is.").unwrap_err();
        assert!(matches!(err, ClassifierError::ExtractionError(_)));

        let err = parse_candidate("} backwards {").unwrap_err();
        assert!(matches!(err, ClassifierError::ExtractionError(_)));
    }

    #[test]
    fn test_malformed_json_is_extraction_error() {
        let err = parse_candidate("{category: HOME, confidence: high}").unwrap_err();
        assert!(matches!(err, ClassifierError::ExtractionError(_)));
    }

    #[test]
    fn test_first_object_wins_when_reply_has_two() {
        let reply = r#"{"category":"HEALTH","subcategory":"Gym","confidence":0.8} or maybe {"category":"OTHER"}"#;
        let candidate = parse_candidate(reply).unwrap();

        assert_eq!(candidate.category, Category::Health);
        assert_eq!(candidate.subcategory, "Gym");
    }

    #[test]
    fn test_missing_fields_are_defaulted() {
        let candidate = parse_candidate("{}").unwrap();
        assert_eq!(candidate, ClassificationCandidate::fallback());

        let candidate = parse_candidate(r#"{"category":"VACATION"}"#).unwrap();
        assert_eq!(candidate.category, Category::Vacation);
        assert_eq!(candidate.subcategory, "OTHER");
        assert_eq!(candidate.confidence, 0.0);
    }

    #[test]
    fn test_merchant_keys_are_ignored() {
        let reply = r#"{"category":"DAILY LIVING","subcategory":"Restaurants","company":"McDonald's","confidence":0.85}"#;
        let candidate = parse_candidate(reply).unwrap();

        assert_eq!(candidate.category, Category::DailyLiving);
        assert_eq!(candidate.subcategory, "Restaurants");
        assert_eq!(candidate.confidence, 0.85);
    }

    #[test]
    fn test_confidence_variants() {
        assert_eq!(read_confidence(&serde_json::json!(0.7)), Some(0.7));
        assert_eq!(read_confidence(&serde_json::json!("0.4")), Some(0.4));
        assert_eq!(read_confidence(&serde_json::json!("80%")), Some(0.8));
        assert_eq!(read_confidence(&serde_json::json!("high")), None);
        assert_eq!(read_confidence(&serde_json::json!(null)), None);

        let candidate = parse_candidate(r#"{"category":"HOME","confidence":"high"}"#).unwrap();
        assert_eq!(candidate.confidence, 0.0);
    }

    #[test]
    fn test_direct_prompt_contents() {
        let request = ClassificationRequest::new("Big Mac", 8.5);
        let prompt = PromptContext::direct(&request).render();

        assert!(prompt.contains("Description: Big Mac"));
        assert!(prompt.contains("Amount: 8.5"));
        assert!(prompt.contains("Company: Unknown"));
        assert!(prompt.contains(r#""category": string"#));
        assert!(prompt.contains("- DAILY LIVING: Groceries, Restaurants"));
        assert!(!prompt.contains("Context from web"));
    }

    #[test]
    fn test_enriched_prompt_contents() {
        let request = ClassificationRequest::new("Big Mac", 8.5).with_company("McDonald's");
        let prompt = PromptContext::enriched(&request, "A hamburger.").render();

        assert!(prompt.contains("Transaction: Big Mac"));
        assert!(prompt.contains("Company: McDonald's"));
        assert!(prompt.contains("Context from web: A hamburger."));
        assert!(prompt.contains("Re-evaluate"));

        let prompt = PromptContext::enriched(&request, "").render();
        assert!(prompt.contains("Context from web: (none)"));
    }

    #[tokio::test]
    async fn test_ask_returns_default_on_model_failure() {
        let model = Arc::new(MockLanguageModel::new().fail("connection refused"));
        let adapter = ModelQueryAdapter::new(model.clone());
        let request = ClassificationRequest::new("Big Mac", 8.5);

        let candidate = adapter.ask(PromptContext::direct(&request)).await;

        assert_eq!(candidate, ClassificationCandidate::fallback());
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_ask_returns_default_on_prose_reply() {
        let model = Arc::new(MockLanguageModel::new().reply("That looks like food to me!"));
        let adapter = ModelQueryAdapter::new(model);
        let request = ClassificationRequest::new("Big Mac", 8.5);

        let candidate = adapter.ask(PromptContext::direct(&request)).await;

        assert_eq!(candidate, ClassificationCandidate::fallback());
    }

    #[tokio::test]
    async fn test_ask_resolves_loose_labels() {
        let model = Arc::new(
            MockLanguageModel::new()
                .reply(r#"Result: {"category":"daily living","subcategory":"restaurant","confidence":0.9}"#),
        );
        let adapter = ModelQueryAdapter::new(model);
        let request = ClassificationRequest::new("Big Mac", 8.5);

        let candidate = adapter.ask(PromptContext::direct(&request)).await;

        assert_eq!(candidate.category, Category::DailyLiving);
        assert_eq!(candidate.subcategory, "Restaurants");
        assert!(candidate.is_confident());
    }
}
