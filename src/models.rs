//! Core data models for the expense classifier

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ClassifierError;
use crate::taxonomy::{Category, TaxonomyEntry};
use crate::Result;

/// Confidence at or above which a candidate is accepted as-is
pub const CONFIDENCE_THRESHOLD: f64 = 0.6;

//
// ================= Request =================
//

/// A single transaction to classify
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub description: String,
    pub amount: f64,
    /// Merchant hint. Used in prompts and search queries, never stored.
    #[serde(default)]
    pub company: Option<String>,
}

impl ClassificationRequest {
    pub fn new(description: impl Into<String>, amount: f64) -> Self {
        Self {
            description: description.into(),
            amount,
            company: None,
        }
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        let company = company.into();
        self.company = if company.trim().is_empty() {
            None
        } else {
            Some(company)
        };
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.description.trim().is_empty() {
            return Err(ClassifierError::ValidationError(
                "description must not be empty".to_string(),
            ));
        }
        if !self.amount.is_finite() {
            return Err(ClassifierError::ValidationError(
                "amount must be a finite number".to_string(),
            ));
        }
        Ok(())
    }

    /// Merchant hint, if one was supplied and is not blank
    pub fn merchant(&self) -> Option<&str> {
        self.company
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

//
// ================= Candidate =================
//

/// Output of one model invocation, already resolved against the taxonomy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationCandidate {
    pub category: Category,
    pub subcategory: &'static str,
    pub confidence: f64,
}

impl ClassificationCandidate {
    pub fn new(entry: TaxonomyEntry, confidence: f64) -> Self {
        Self {
            category: entry.category,
            subcategory: entry.subcategory,
            confidence: clamp_confidence(confidence),
        }
    }

    /// OTHER/OTHER/0.0, returned whenever a model attempt fails
    pub fn fallback() -> Self {
        Self::new(TaxonomyEntry::OTHER, 0.0)
    }

    /// UNCLASSIFIED/UNCLASSIFIED/0.0, returned when classification is off
    pub fn unclassified() -> Self {
        Self::new(TaxonomyEntry::UNCLASSIFIED, 0.0)
    }

    pub fn is_confident(&self) -> bool {
        self.confidence >= CONFIDENCE_THRESHOLD
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

//
// ================= Normalized Result =================
//

/// Schema-complete classification record handed to persistence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifiedTransaction {
    /// Day the classification ran, not the day of the transaction
    pub date: NaiveDate,
    pub description: String,
    pub amount: f64,
    pub category: Category,
    pub subcategory: String,
    pub confidence: f64,
}

impl ClassifiedTransaction {
    pub fn from_candidate(
        request: &ClassificationRequest,
        candidate: ClassificationCandidate,
        date: NaiveDate,
    ) -> Self {
        Self {
            date,
            description: request.description.clone(),
            amount: request.amount,
            category: candidate.category,
            subcategory: candidate.subcategory.to_string(),
            confidence: candidate.confidence,
        }
    }
}

/// A classified transaction after persistence assigned it an id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTransaction {
    pub id: i64,
    #[serde(flatten)]
    pub record: ClassifiedTransaction,
    pub created_at: DateTime<Utc>,
}
