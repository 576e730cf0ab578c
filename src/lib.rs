//! Expense Classifier
//!
//! Classifies a free-text transaction description (plus amount and an
//! optional merchant hint) into a fixed category/subcategory taxonomy:
//! - Asks a language model directly
//! - Falls back to web-search-enriched re-classification when unsure
//! - Repairs structured output from conversational model replies
//! - Always produces a well-formed record, worst case OTHER/OTHER/0.0
//!
//! PIPELINE:
//! ASK → GATE → SEARCH → ASK AGAIN → GATE → NORMALIZE

pub mod adapter;
pub mod api;
pub mod classifier;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod search;
pub mod store;
pub mod taxonomy;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use classifier::{ClassificationPipeline, ExpenseClassifier, Resolution};
pub use taxonomy::Category;
