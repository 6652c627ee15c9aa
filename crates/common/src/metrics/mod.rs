//! Metrics and observability utilities
//!
//! Counters and histograms for the batch run, recorded through the `metrics`
//! facade. A Prometheus recorder renders them at the end of the run so they can
//! be pushed to a pushgateway, the usual sink for short-lived jobs.

use crate::errors::{AppError, Result};
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Metrics prefix for all catalog prep metrics
pub const METRICS_PREFIX: &str = "catalog_prep";

/// Buckets for image fetch-and-upload latency (in seconds)
pub const IMAGE_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    20.00,  // 20s - default fetch timeout
];

fn name(suffix: &str) -> String {
    format!("{}_{}", METRICS_PREFIX, suffix)
}

/// Install the Prometheus recorder and register metric descriptions
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Suffix("image_mirror_duration_seconds".to_string()),
            IMAGE_BUCKETS,
        )
        .map_err(|e| AppError::Internal {
            message: format!("Invalid histogram buckets: {}", e),
        })?
        .install_recorder()
        .map_err(|e| AppError::Internal {
            message: format!("Failed to install metrics recorder: {}", e),
        })?;

    register_metrics();
    Ok(handle)
}

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        name("records_processed_total"),
        Unit::Count,
        "Input records turned into rows"
    );

    describe_counter!(
        name("discrepancies_injected_total"),
        Unit::Count,
        "Rows whose marketing text received a discrepancy, by kind"
    );

    describe_counter!(
        name("images_mirrored_total"),
        Unit::Count,
        "Images copied into object storage"
    );

    describe_counter!(
        name("image_failures_total"),
        Unit::Count,
        "Images that could not be mirrored, by reason"
    );

    describe_histogram!(
        name("image_mirror_duration_seconds"),
        Unit::Seconds,
        "Image fetch plus upload latency in seconds"
    );

    describe_counter!(
        name("rows_loaded_total"),
        Unit::Count,
        "Rows committed to the warehouse"
    );

    describe_histogram!(
        name("load_duration_seconds"),
        Unit::Seconds,
        "Warehouse load job latency in seconds"
    );

    tracing::debug!("Metrics registered");
}

/// Record one processed record
pub fn record_row(discrepancy_kind: Option<&str>) {
    counter!(name("records_processed_total")).increment(1);

    if let Some(kind) = discrepancy_kind {
        counter!(name("discrepancies_injected_total"), "kind" => kind.to_string()).increment(1);
    }
}

/// Record one image mirror attempt
pub fn record_image(duration_secs: f64, failure_reason: Option<&str>) {
    histogram!(name("image_mirror_duration_seconds")).record(duration_secs);

    match failure_reason {
        None => counter!(name("images_mirrored_total")).increment(1),
        Some(reason) => {
            counter!(name("image_failures_total"), "reason" => reason.to_string()).increment(1)
        }
    }
}

/// Record a completed warehouse load
pub fn record_load(duration_secs: f64, rows_loaded: u64) {
    counter!(name("rows_loaded_total")).increment(rows_loaded);
    histogram!(name("load_duration_seconds")).record(duration_secs);
}

/// Push the rendered exposition to a Prometheus pushgateway under `job`
pub async fn push_to_gateway(
    client: &reqwest::Client,
    gateway_url: &str,
    job: &str,
    handle: &PrometheusHandle,
) -> Result<()> {
    let url = format!("{}/metrics/job/{}", gateway_url.trim_end_matches('/'), job);
    let response = client
        .put(&url)
        .header(reqwest::header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(handle.render())
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(AppError::Internal {
            message: format!("Pushgateway returned {}", response.status()),
        });
    }

    tracing::debug!(url = %url, "Metrics pushed");
    Ok(())
}
