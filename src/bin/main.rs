//! One-shot classification from the command line.
//!
//! Usage: classify <description> <amount> [company]

use expense_classifier::{
    classifier::ClassificationPipeline,
    config::{log_filter, ClassifierConfig},
    models::ClassificationRequest,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env first so RUST_LOG from it reaches the filter
    dotenv::dotenv().ok();

    // Initialize tracing (stderr, so stdout stays pure JSON)
    tracing_subscriber::fmt()
        .with_env_filter(log_filter("warn"))
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(description), Some(amount)) = (args.next(), args.next()) else {
        eprintln!("Usage: classify <description> <amount> [company]");
        std::process::exit(2);
    };
    let amount: f64 = amount
        .parse()
        .map_err(|_| format!("amount must be a number, got '{}'", amount))?;

    let mut request = ClassificationRequest::new(description, amount);
    if let Some(company) = args.next() {
        request = request.with_company(company);
    }
    request.validate()?;

    let config = ClassifierConfig::from_env()?;
    let pipeline = ClassificationPipeline::from_config(&config)?;

    info!(description = %request.description, "Classifying transaction");

    let record = pipeline.classify(&request).await;
    println!("{}", serde_json::to_string_pretty(&record)?);

    Ok(())
}
