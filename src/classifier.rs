//! Expense classifier
//!
//! Two-stage protocol:
//! ASK → GATE → (SEARCH → ASK AGAIN → GATE) → NORMALIZE
//!
//! The first attempt is the floor: if the enriched retry is not confident
//! either, the first answer is returned.

use crate::adapter::{ModelQueryAdapter, PromptContext};
use crate::config::ClassifierConfig;
use crate::llm::{self, LanguageModel};
use crate::models::{ClassificationCandidate, ClassificationRequest, ClassifiedTransaction};
use crate::search::{BraveSearch, SearchProvider, WebEnrichment};
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which attempt produced the returned candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// First attempt cleared the threshold
    Direct,
    /// Enriched retry cleared the threshold
    Enriched,
    /// Neither did; first attempt returned
    FirstAttemptFloor,
    /// Pipeline switched off
    Disabled,
}

/// Confidence-gated classifier with web-enriched retry
pub struct ExpenseClassifier {
    adapter: ModelQueryAdapter,
    enrichment: WebEnrichment,
}

impl ExpenseClassifier {
    pub fn new(model: Arc<dyn LanguageModel>, search: Arc<dyn SearchProvider>) -> Self {
        Self {
            adapter: ModelQueryAdapter::new(model),
            enrichment: WebEnrichment::new(search),
        }
    }

    /// Run the gating protocol and return the winning candidate
    pub async fn classify_candidate(
        &self,
        request: &ClassificationRequest,
    ) -> (ClassificationCandidate, Resolution) {
        // === ATTEMPT 1 ===
        let first = self.adapter.ask(PromptContext::direct(request)).await;

        debug!(
            category = %first.category,
            subcategory = first.subcategory,
            confidence = first.confidence,
            "First attempt"
        );

        if first.is_confident() {
            return (first, Resolution::Direct);
        }

        // === ENRICH ===
        let web_context = self.enrichment.lookup(request).await;

        // === ATTEMPT 2 ===
        let refined = self
            .adapter
            .ask(PromptContext::enriched(request, &web_context))
            .await;

        debug!(
            category = %refined.category,
            subcategory = refined.subcategory,
            confidence = refined.confidence,
            context_chars = web_context.chars().count(),
            "Enriched attempt"
        );

        if refined.is_confident() {
            (refined, Resolution::Enriched)
        } else {
            (first, Resolution::FirstAttemptFloor)
        }
    }

    pub async fn classify(&self, request: &ClassificationRequest) -> ClassifiedTransaction {
        let (candidate, resolution) = self.classify_candidate(request).await;
        normalize(request, candidate, resolution)
    }
}

/// Classification entry point handed to request handlers
pub enum ClassificationPipeline {
    Enabled(ExpenseClassifier),
    /// Every request yields UNCLASSIFIED without touching any provider
    Disabled,
}

impl ClassificationPipeline {
    /// Build the pipeline described by configuration
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        if !config.enabled {
            info!("Expense classifier disabled");
            return Ok(ClassificationPipeline::Disabled);
        }

        let model = llm::from_config(config)?;
        let search = Arc::new(BraveSearch::new(
            config.search_endpoint.clone(),
            config.search_api_key.clone(),
            config.search_timeout,
        )?);
        if !search.is_configured() {
            warn!("BRAVE_SEARCH_API_KEY not set, low-confidence retries get no web context");
        }

        info!(
            model = model.name(),
            model_name = %config.model,
            search = search.name(),
            "Expense classifier enabled"
        );

        Ok(ClassificationPipeline::Enabled(ExpenseClassifier::new(
            model, search,
        )))
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, ClassificationPipeline::Enabled(_))
    }

    /// Classify one transaction. Never fails; the worst case is OTHER/OTHER/0.0.
    pub async fn classify(&self, request: &ClassificationRequest) -> ClassifiedTransaction {
        match self {
            ClassificationPipeline::Enabled(classifier) => classifier.classify(request).await,
            ClassificationPipeline::Disabled => normalize(
                request,
                ClassificationCandidate::unclassified(),
                Resolution::Disabled,
            ),
        }
    }
}

fn normalize(
    request: &ClassificationRequest,
    candidate: ClassificationCandidate,
    resolution: Resolution,
) -> ClassifiedTransaction {
    info!(
        description = %request.description,
        category = %candidate.category,
        subcategory = candidate.subcategory,
        confidence = candidate.confidence,
        resolution = ?resolution,
        "Transaction classified"
    );

    ClassifiedTransaction::from_candidate(request, candidate, Utc::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLanguageModel;
    use crate::search::{MockSearch, SearchHit};
    use crate::taxonomy::Category;

    fn classifier(
        model: MockLanguageModel,
        search: MockSearch,
    ) -> (ExpenseClassifier, Arc<MockLanguageModel>, Arc<MockSearch>) {
        let model = Arc::new(model);
        let search = Arc::new(search);
        (
            ExpenseClassifier::new(model.clone(), search.clone()),
            model,
            search,
        )
    }

    fn hits() -> MockSearch {
        MockSearch::with_hits(vec![SearchHit::new("McDonald's sells hamburgers.")])
    }

    #[tokio::test]
    async fn test_confident_first_attempt_skips_search() {
        let (classifier, model, search) = classifier(
            MockLanguageModel::new().reply(
                r#"{"category":"DAILY LIVING","subcategory":"Restaurants","confidence":0.85}"#,
            ),
            hits(),
        );
        let request = ClassificationRequest::new("Big Mac", 8.50);

        let result = classifier.classify(&request).await;

        assert_eq!(result.category, Category::DailyLiving);
        assert_eq!(result.subcategory, "Restaurants");
        assert_eq!(result.description, "Big Mac");
        assert_eq!(result.amount, 8.50);
        assert_eq!(result.date, Utc::now().date_naive());
        assert_eq!(model.calls(), 1);
        assert_eq!(search.calls(), 0);
    }

    #[tokio::test]
    async fn test_low_confidence_uses_enriched_answer() {
        let (classifier, model, search) = classifier(
            MockLanguageModel::new()
                .reply(r#"{"category":"OTHER","subcategory":"OTHER","confidence":0.2}"#)
                .reply(r#"{"category":"DAILY LIVING","subcategory":"Restaurants","confidence":0.9}"#),
            hits(),
        );
        let request = ClassificationRequest::new("Big Mac", 8.5).with_company("McDonald's");

        let (candidate, resolution) = classifier.classify_candidate(&request).await;

        assert_eq!(resolution, Resolution::Enriched);
        assert_eq!(candidate.category, Category::DailyLiving);
        assert_eq!(model.calls(), 2);
        assert_eq!(search.calls(), 1);
        assert_eq!(search.queries(), vec!["Big Mac McDonald's"]);

        let prompts = model.prompts();
        assert!(prompts[1].contains("Context from web: McDonald's sells hamburgers."));
        assert!(prompts[1].contains("Company: McDonald's"));
    }

    #[tokio::test]
    async fn test_both_attempts_weak_returns_first() {
        let (classifier, _model, _search) = classifier(
            MockLanguageModel::new()
                .reply(r#"{"category":"ENTERTAINMENT","subcategory":"Movies","confidence":0.4}"#)
                .reply(r#"{"category":"HOME","subcategory":"Rent","confidence":0.5}"#),
            hits(),
        );
        let request = ClassificationRequest::new("AMC 12", 15.0);

        let (candidate, resolution) = classifier.classify_candidate(&request).await;

        assert_eq!(resolution, Resolution::FirstAttemptFloor);
        assert_eq!(candidate.category, Category::Entertainment);
        assert_eq!(candidate.subcategory, "Movies");
        assert_eq!(candidate.confidence, 0.4);
    }

    #[tokio::test]
    async fn test_missing_confidence_triggers_enrichment() {
        let (classifier, model, search) = classifier(
            MockLanguageModel::new()
                .reply(r#"{"category":"HOME","subcategory":"Rent"}"#)
                .reply(r#"{"category":"HOME","subcategory":"Rent","confidence":0.7}"#),
            hits(),
        );
        let request = ClassificationRequest::new("April rent", 900.0);

        let (candidate, resolution) = classifier.classify_candidate(&request).await;

        assert_eq!(resolution, Resolution::Enriched);
        assert_eq!(candidate.confidence, 0.7);
        assert_eq!(model.calls(), 2);
        assert_eq!(search.calls(), 1);
    }

    #[tokio::test]
    async fn test_search_failure_does_not_abort() {
        let (classifier, model, search) = classifier(
            MockLanguageModel::new()
                .reply("no idea")
                .reply(r#"{"category":"TRANSPORTATION","subcategory":"Gas","confidence":0.65}"#),
            MockSearch::failing("network down"),
        );
        let request = ClassificationRequest::new("Shell 4471", 40.0);

        let result = classifier.classify(&request).await;

        assert_eq!(result.category, Category::Transportation);
        assert_eq!(result.subcategory, "Gas");
        assert_eq!(search.calls(), 1);
        assert!(model.prompts()[1].contains("Context from web: (none)"));
    }

    #[tokio::test]
    async fn test_total_failure_yields_other() {
        let (classifier, model, _search) = classifier(
            MockLanguageModel::new().fail("timeout").fail("timeout"),
            MockSearch::failing("timeout"),
        );
        let request = ClassificationRequest::new("???", 1.0);

        let result = classifier.classify(&request).await;

        assert_eq!(result.category, Category::Other);
        assert_eq!(result.subcategory, "OTHER");
        assert_eq!(result.confidence, 0.0);
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn test_disabled_pipeline_short_circuits() {
        let pipeline = ClassificationPipeline::Disabled;
        let request = ClassificationRequest::new("Big Mac", 8.5);

        let result = pipeline.classify(&request).await;

        assert!(!pipeline.is_enabled());
        assert_eq!(result.category, Category::Unclassified);
        assert_eq!(result.subcategory, "UNCLASSIFIED");
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.description, "Big Mac");
    }

    #[tokio::test]
    async fn test_enabled_pipeline_delegates() {
        let model = Arc::new(MockLanguageModel::new().reply(
            r#"{"category":"HEALTH","subcategory":"Gym","confidence":0.95}"#,
        ));
        let search = Arc::new(hits());
        let pipeline =
            ClassificationPipeline::Enabled(ExpenseClassifier::new(model.clone(), search.clone()));

        let result = pipeline
            .classify(&ClassificationRequest::new("Planet Fitness", 10.0))
            .await;

        assert_eq!(result.category, Category::Health);
        assert_eq!(model.calls(), 1);
        assert_eq!(search.calls(), 0);
    }

    #[test]
    fn test_from_config_respects_enable_flag() {
        let config = ClassifierConfig::from_lookup(|key| match key {
            "CLASSIFIER_ENABLED" => Some("false".to_string()),
            _ => None,
        })
        .unwrap();
        assert!(!ClassificationPipeline::from_config(&config).unwrap().is_enabled());

        let config = ClassifierConfig::from_lookup(|_| None).unwrap();
        assert!(ClassificationPipeline::from_config(&config).unwrap().is_enabled());
    }
}
