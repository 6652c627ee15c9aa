//! Catalog Prep batch job
//!
//! Reads a JSON array of product records, builds warehouse rows and loads them:
//! 1. Loads configuration (an optional first argument overrides the input path)
//! 2. Acquires Google Cloud credentials
//! 3. Mirrors images and injects discrepancies record by record
//! 4. Submits a single load job and waits for it

use catalog_prep_common::{
    config::{AppConfig, ObservabilityConfig},
    metrics,
    storage::GcsObjectStore,
    warehouse::BigQueryWarehouse,
    TokenProvider, VERSION,
};
use catalog_prep_ingestion::{
    image::{HttpImageFetcher, ImageMirror},
    records::load_records,
    BatchProcessor, IngestionError,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(observability: &ObservabilityConfig) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&observability.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let mut vars: HashMap<String, String> = std::env::vars().collect();
    if let Some(input) = std::env::args().nth(1) {
        vars.insert("INPUT_JSON".to_string(), input);
    }

    // Load configuration
    let config = match AppConfig::from_vars(vars) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(&ObservabilityConfig::default());
            error!(error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };

    init_tracing(&config.observability);
    info!("Starting Catalog Prep v{}", VERSION);

    // Initialize metrics
    let prometheus = match metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Metrics recorder unavailable");
            None
        }
    };

    let records = load_records(&config.ingest.input_path)?;
    info!(
        path = %config.ingest.input_path.display(),
        records = records.len(),
        "Input loaded"
    );

    // Fail before any upload if credentials are unusable
    let tokens = Arc::new(TokenProvider::from_config(&config.gcp)?);
    tokens.token().await?;
    info!(source = tokens.source_kind(), "Credentials acquired");

    let client = reqwest::Client::new();
    let store = Arc::new(GcsObjectStore::new(
        client.clone(),
        tokens.clone(),
        &config.gcp.storage_endpoint,
        config.storage.bucket.clone(),
    ));
    let warehouse = Arc::new(BigQueryWarehouse::new(client.clone(), tokens, &config));
    let fetcher = Arc::new(HttpImageFetcher::new(config.fetch_timeout())?);
    let mirror = ImageMirror::new(
        fetcher,
        store,
        config.storage.object_prefix.clone(),
        config.storage.content_type.clone(),
    );

    let processor = BatchProcessor::from_config(&config, mirror, warehouse);
    let summary = processor.run(&records).await.map_err(|e| {
        match &e {
            IngestionError::App(app) => error!(error = %e, code = app.code().as_code(), "Batch failed"),
            _ => error!(error = %e, "Batch failed"),
        }
        e
    })?;

    println!("Loaded {} rows into {}", summary.rows_loaded, summary.table_id);
    if summary.missing_images > 0 {
        println!(
            "[INFO] {} rows had missing/failed image upload (kept in table).",
            summary.missing_images
        );
    }

    if let (Some(url), Some(handle)) = (&config.observability.pushgateway_url, &prometheus) {
        if let Err(e) =
            metrics::push_to_gateway(&client, url, &config.observability.service_name, handle).await
        {
            warn!(error = %e, "Failed to push metrics");
        }
    }

    Ok(())
}
