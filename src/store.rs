//! Classified transaction persistence
//!
//! Stores the normalized classification record and assigns it a durable id.
//! Postgres when a database URL is configured, in-memory otherwise.
//! The merchant hint is never stored.

use crate::error::ClassifierError;
use crate::models::{ClassifiedTransaction, StoredTransaction};
use crate::taxonomy::Category;
use crate::Result;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn};

/// Trait for transaction persistence
#[async_trait::async_trait]
pub trait TransactionStore: Send + Sync {
    /// Persist a record and return its id
    async fn save(&self, record: &ClassifiedTransaction) -> Result<i64>;
    async fn get(&self, id: i64) -> Result<Option<StoredTransaction>>;
}

/// Reject records persistence cannot hold
fn validate(record: &ClassifiedTransaction) -> Result<()> {
    if record.description.trim().is_empty() {
        return Err(ClassifierError::ValidationError(
            "Transaction data must include 'description'".to_string(),
        ));
    }
    if !record.amount.is_finite() {
        return Err(ClassifierError::ValidationError(
            "Transaction data must include a numeric 'amount'".to_string(),
        ));
    }
    Ok(())
}

/// Build the store for the configured database, falling back to in-memory
pub fn build_store(database_url: Option<&str>) -> Arc<dyn TransactionStore> {
    if let Some(url) = database_url {
        match PostgresTransactionStore::connect_lazy(url) {
            Ok(store) => {
                info!("Transaction store backend: postgres");
                return Arc::new(store);
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres store, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Transaction store backend: in-memory");
    Arc::new(InMemoryTransactionStore::new())
}

// =============================
// In-memory
// =============================

/// In-memory store for development
pub struct InMemoryTransactionStore {
    records: Arc<RwLock<HashMap<i64, StoredTransaction>>>,
    next_id: Arc<RwLock<i64>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(RwLock::new(1)),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

impl Default for InMemoryTransactionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn save(&self, record: &ClassifiedTransaction) -> Result<i64> {
        validate(record)?;

        let id = {
            let mut next = self.next_id.write().await;
            let id = *next;
            *next += 1;
            id
        };

        let mut records = self.records.write().await;
        records.insert(
            id,
            StoredTransaction {
                id,
                record: record.clone(),
                created_at: Utc::now(),
            },
        );

        info!("Saved new transaction ID: {}", id);
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Option<StoredTransaction>> {
        let records = self.records.read().await;
        Ok(records.get(&id).cloned())
    }
}

// =============================
// Postgres
// =============================

pub struct PostgresTransactionStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PostgresTransactionStore {
    /// Create the pool without connecting; the first query connects
    pub fn connect_lazy(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(url)
            .map_err(|e| {
                ClassifierError::DatabaseError(format!("Invalid database URL: {}", e))
            })?;

        Ok(Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        })
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS classified_transactions (
                      id SERIAL PRIMARY KEY,
                      date DATE NOT NULL,
                      description VARCHAR(255) NOT NULL,
                      amount DOUBLE PRECISION NOT NULL,
                      category VARCHAR(100),
                      subcategory VARCHAR(100),
                      confidence DOUBLE PRECISION NOT NULL DEFAULT 0,
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                ClassifierError::DatabaseError(format!(
                    "Failed to initialize classified_transactions schema: {}",
                    e
                ))
            })?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl TransactionStore for PostgresTransactionStore {
    async fn save(&self, record: &ClassifiedTransaction) -> Result<i64> {
        validate(record)?;
        self.ensure_schema().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO classified_transactions
              (date, description, amount, category, subcategory, confidence)
            VALUES
              ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(record.date)
        .bind(&record.description)
        .bind(record.amount)
        .bind(record.category.as_str())
        .bind(&record.subcategory)
        .bind(record.confidence)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            ClassifierError::DatabaseError(format!(
                "Failed to commit transaction to database: {}",
                e
            ))
        })?;

        let id: i32 = row.try_get("id").map_err(|e| {
            ClassifierError::DatabaseError(format!("Missing id in insert result: {}", e))
        })?;

        info!("Saved new transaction ID: {}", id);
        Ok(i64::from(id))
    }

    async fn get(&self, id: i64) -> Result<Option<StoredTransaction>> {
        self.ensure_schema().await?;

        let id = match i32::try_from(id) {
            Ok(id) => id,
            Err(_) => return Ok(None),
        };

        let row = sqlx::query(
            r#"
            SELECT id, date, description, amount, category, subcategory, confidence, created_at
            FROM classified_transactions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            ClassifierError::DatabaseError(format!("Failed to load transaction {}: {}", id, e))
        })?;

        let Some(row) = row else {
            return Ok(None);
        };

        let read_err = |e: sqlx::Error| {
            ClassifierError::DatabaseError(format!("Malformed transaction row {}: {}", id, e))
        };

        let category: Option<String> = row.try_get("category").map_err(read_err)?;
        let subcategory: Option<String> = row.try_get("subcategory").map_err(read_err)?;
        let date: NaiveDate = row.try_get("date").map_err(read_err)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(read_err)?;

        Ok(Some(StoredTransaction {
            id: i64::from(id),
            record: ClassifiedTransaction {
                date,
                description: row.try_get("description").map_err(read_err)?,
                amount: row.try_get("amount").map_err(read_err)?,
                category: category
                    .as_deref()
                    .map(category_from_db)
                    .unwrap_or(Category::Other),
                subcategory: subcategory.unwrap_or_else(|| crate::taxonomy::OTHER.to_string()),
                confidence: row.try_get("confidence").map_err(read_err)?,
            },
            created_at,
        }))
    }
}

fn category_from_db(value: &str) -> Category {
    if value == crate::taxonomy::UNCLASSIFIED {
        return Category::Unclassified;
    }
    Category::resolve(value).unwrap_or(Category::Other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassificationCandidate, ClassificationRequest};

    fn record(description: &str, amount: f64) -> ClassifiedTransaction {
        ClassifiedTransaction::from_candidate(
            &ClassificationRequest::new(description, amount),
            ClassificationCandidate::fallback(),
            Utc::now().date_naive(),
        )
    }

    #[tokio::test]
    async fn test_in_memory_assigns_sequential_ids() {
        let store = InMemoryTransactionStore::new();

        let first = store.save(&record("Big Mac", 8.5)).await.unwrap();
        let second = store.save(&record("Rent", 900.0)).await.unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(store.len().await, 2);

        let loaded = store.get(second).await.unwrap().unwrap();
        assert_eq!(loaded.record.description, "Rent");
        assert_eq!(loaded.record.amount, 900.0);
        assert!(store.get(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_missing_description_or_amount() {
        let store = InMemoryTransactionStore::new();

        let err = store.save(&record("  ", 8.5)).await.unwrap_err();
        assert!(err.is_validation());

        let err = store.save(&record("Big Mac", f64::INFINITY)).await.unwrap_err();
        assert!(err.is_validation());

        assert_eq!(store.len().await, 0);
    }

    #[test]
    fn test_category_from_db() {
        assert_eq!(category_from_db("DAILY LIVING"), Category::DailyLiving);
        assert_eq!(category_from_db("UNCLASSIFIED"), Category::Unclassified);
        assert_eq!(category_from_db("garbage"), Category::Other);
    }

    #[tokio::test]
    async fn test_build_store_without_url_is_in_memory() {
        let store = build_store(None);
        let id = store.save(&record("Big Mac", 8.5)).await.unwrap();
        assert!(store.get(id).await.unwrap().is_some());
    }
}
