//! REST API Server for the expense classifier
//!
//! Validates incoming transactions, runs the classification pipeline and
//! persists the normalized record.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::classifier::ClassificationPipeline;
use crate::error::ClassifierError;
use crate::models::ClassificationRequest;
use crate::store::TransactionStore;

/// =============================
/// Request Models
/// =============================

/// Wire shape of a classification request; required fields are checked
/// explicitly so a missing field is a 400 with a message, not a 422.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ClassifyRequest {
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub company: Option<String>,
}

impl ClassifyRequest {
    fn into_request(self) -> crate::Result<ClassificationRequest> {
        let description = self
            .description
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| {
                ClassifierError::ValidationError("Missing 'description'".to_string())
            })?;
        let amount = self
            .amount
            .ok_or_else(|| ClassifierError::ValidationError("Missing 'amount'".to_string()))?;

        let mut request = ClassificationRequest::new(description, amount);
        if let Some(company) = self.company {
            request = request.with_company(company);
        }
        request.validate()?;
        Ok(request)
    }
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<ClassificationPipeline>,
    pub store: Arc<dyn TransactionStore>,
}

fn status_for(error: &ClassifierError) -> StatusCode {
    if error.is_validation() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Classification Endpoint
/// =============================

async fn classify_transaction(
    State(state): State<ApiState>,
    Json(req): Json<ClassifyRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let request = match req.into_request() {
        Ok(request) => request,
        Err(e) => return (status_for(&e), Json(ApiResponse::error(e.to_string()))),
    };

    info!("Received classification request: {}", request.description);

    let record = state.pipeline.classify(&request).await;

    match state.store.save(&record).await {
        Ok(id) => {
            let mut data = serde_json::to_value(&record).unwrap_or_default();
            data["id"] = serde_json::json!(id);
            (StatusCode::OK, Json(ApiResponse::success(data)))
        }
        Err(e) => {
            error!("Failed to save classified transaction: {}", e);
            (status_for(&e), Json(ApiResponse::error(e.to_string())))
        }
    }
}

async fn get_transaction(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.store.get(id).await {
        Ok(Some(stored)) => (StatusCode::OK, Json(ApiResponse::success(stored))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Transaction {} not found", id))),
        ),
        Err(e) => (status_for(&e), Json(ApiResponse::error(e.to_string()))),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(pipeline: Arc<ClassificationPipeline>, store: Arc<dyn TransactionStore>) -> Router {
    let state = ApiState { pipeline, store };

    Router::new()
        .route("/health", get(health))
        .route("/api/classify", post(classify_transaction))
        .route("/api/transactions/:id", get(get_transaction))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    pipeline: Arc<ClassificationPipeline>,
    store: Arc<dyn TransactionStore>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(pipeline, store);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
