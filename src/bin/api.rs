use expense_classifier::{
    api::start_server,
    classifier::ClassificationPipeline,
    config::{log_filter, ClassifierConfig, ServerConfig},
    store::build_store,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables before the filter reads RUST_LOG
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(log_filter("info"))
        .init();

    let classifier_config = ClassifierConfig::from_env()?;
    let server_config = ServerConfig::from_env()?;

    info!("Expense Classifier - API Server");
    info!("Port: {}", server_config.port);

    let pipeline = Arc::new(ClassificationPipeline::from_config(&classifier_config)?);
    let store = build_store(server_config.database_url.as_deref());

    info!("Pipeline initialized (enabled: {})", pipeline.is_enabled());

    start_server(pipeline, store, server_config.port).await?;

    Ok(())
}
