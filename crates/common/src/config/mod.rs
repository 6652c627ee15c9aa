//! Configuration management for catalog prep
//!
//! Supports loading configuration from:
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Environment variables (prefixed with APP__)
//! - The flat variables used by existing deployment scripts (PROJECT_ID, GCS_BUCKET, ...)
//! - Default values

use crate::errors::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Flat environment variables and the configuration keys they override.
///
/// Later entries win when both are set, so `GOOGLE_CLOUD_PROJECT` beats `PROJECT_ID`.
const LEGACY_VARS: &[(&str, &str)] = &[
    ("PROJECT_ID", "gcp.project_id"),
    ("GOOGLE_CLOUD_PROJECT", "gcp.project_id"),
    ("BQ_LOCATION", "gcp.location"),
    ("GOOGLE_APPLICATION_CREDENTIALS", "gcp.credentials_path"),
    ("GOOGLE_OAUTH_ACCESS_TOKEN", "gcp.access_token"),
    ("GCS_BUCKET", "storage.bucket"),
    ("BQ_DATASET", "warehouse.dataset"),
    ("BQ_TABLE", "warehouse.table"),
    ("INPUT_JSON", "ingest.input_path"),
    ("RANDOM_SEED", "ingest.random_seed"),
    ("DISCREPANCY_RATE", "ingest.discrepancy_rate"),
];

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AppConfig {
    /// Google Cloud project, location and credentials
    #[validate(nested)]
    pub gcp: GcpConfig,

    /// Object storage destination for mirrored images
    #[validate(nested)]
    pub storage: StorageConfig,

    /// Warehouse destination for product rows
    #[serde(default)]
    #[validate(nested)]
    pub warehouse: WarehouseConfig,

    /// Batch input and discrepancy settings
    #[validate(nested)]
    pub ingest: IngestConfig,

    /// Observability configuration
    #[serde(default)]
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct GcpConfig {
    /// Project that owns the bucket, dataset and load jobs
    #[validate(length(min = 1))]
    pub project_id: String,

    /// Dataset and load job location
    #[serde(default = "default_location")]
    pub location: String,

    /// Service account key file
    pub credentials_path: Option<PathBuf>,

    /// Pre-issued OAuth2 access token (takes precedence over everything else)
    pub access_token: Option<String>,

    /// Cloud Storage API root
    #[serde(default = "default_storage_endpoint")]
    #[validate(url)]
    pub storage_endpoint: String,

    /// BigQuery API root
    #[serde(default = "default_bigquery_endpoint")]
    #[validate(url)]
    pub bigquery_endpoint: String,

    /// GCE metadata server root
    #[serde(default = "default_metadata_endpoint")]
    #[validate(url)]
    pub metadata_endpoint: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct StorageConfig {
    /// Destination bucket
    #[validate(length(min = 1))]
    pub bucket: String,

    /// Object key prefix; objects land at `{prefix}/{product_id}.jpg`
    #[serde(default = "default_object_prefix")]
    pub object_prefix: String,

    /// Content type stamped on every mirrored object
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct WarehouseConfig {
    #[serde(default = "default_dataset")]
    #[validate(length(min = 1))]
    pub dataset: String,

    #[serde(default = "default_table")]
    #[validate(length(min = 1))]
    pub table: String,

    /// Interval between load job status checks
    #[serde(default = "default_load_poll_interval")]
    #[validate(range(min = 1))]
    pub load_poll_interval_ms: u64,

    /// Give up waiting on a load job after this many seconds
    #[serde(default = "default_load_timeout")]
    #[validate(range(min = 1))]
    pub load_timeout_secs: u64,
}

/// What the injector does when the chosen toggle phrase is absent from the text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleMissPolicy {
    /// Append an additive claim instead
    #[default]
    AppendAdditive,
    /// Return the text untouched
    Unchanged,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct IngestConfig {
    /// JSON array of product records
    pub input_path: PathBuf,

    /// Seed for the discrepancy random stream
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,

    /// Share of records that receive an injected discrepancy
    #[serde(default = "default_discrepancy_rate")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub discrepancy_rate: f64,

    /// Per-image fetch timeout in seconds
    #[serde(default = "default_fetch_timeout")]
    #[validate(range(min = 1))]
    pub fetch_timeout_secs: u64,

    #[serde(default)]
    pub toggle_miss_policy: ToggleMissPolicy,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ObservabilityConfig {
    /// Log level or filter directive (debug, info, catalog_prep_ingestion=debug, ...)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name used as the metrics job label
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Prometheus pushgateway; metrics are pushed once at the end of a run
    #[validate(url)]
    pub pushgateway_url: Option<String>,
}

// Default value functions
fn default_location() -> String { "europe-north1".to_string() }
fn default_storage_endpoint() -> String { "https://storage.googleapis.com".to_string() }
fn default_bigquery_endpoint() -> String { "https://bigquery.googleapis.com".to_string() }
fn default_metadata_endpoint() -> String { "http://metadata.google.internal".to_string() }
fn default_object_prefix() -> String { "products".to_string() }
fn default_content_type() -> String { "image/jpeg".to_string() }
fn default_dataset() -> String { "products".to_string() }
fn default_table() -> String { "products_raw".to_string() }
fn default_load_poll_interval() -> u64 { 1000 }
fn default_load_timeout() -> u64 { 300 }
fn default_random_seed() -> u64 { 42 }
fn default_discrepancy_rate() -> f64 { 0.18 }
fn default_fetch_timeout() -> u64 { 20 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "catalog-prep".to_string() }

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            dataset: default_dataset(),
            table: default_table(),
            load_poll_interval_ms: default_load_poll_interval(),
            load_timeout_secs: default_load_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            service_name: default_service_name(),
            pushgateway_url: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and an explicit set of environment variables
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        let env = vars
            .get("APP_ENV")
            .cloned()
            .unwrap_or_else(|| "development".to_string());

        let mut builder = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__INGEST__RANDOM_SEED=7
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(vars.clone().into_iter().collect())),
            );

        for (var, key) in LEGACY_VARS {
            let value = vars.get(*var).filter(|v| !v.is_empty()).cloned();
            builder = builder.set_override_option(*key, value)?;
        }

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Per-image fetch timeout as Duration
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.ingest.fetch_timeout_secs)
    }

    /// Load job poll interval as Duration
    pub fn load_poll_interval(&self) -> Duration {
        Duration::from_millis(self.warehouse.load_poll_interval_ms)
    }

    /// Load job deadline as Duration
    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.warehouse.load_timeout_secs)
    }

    /// Fully qualified destination table, `project.dataset.table`
    pub fn table_id(&self) -> String {
        format!(
            "{}.{}.{}",
            self.gcp.project_id, self.warehouse.dataset, self.warehouse.table
        )
    }
}
