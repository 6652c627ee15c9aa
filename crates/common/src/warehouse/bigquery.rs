//! BigQuery warehouse over the v2 REST API
//!
//! Dataset and table creation treat `409 Conflict` as "already there". Rows are
//! shipped as newline-delimited JSON in a single multipart load job, which is
//! then polled until BigQuery reports it `DONE`.

use super::schema::TableSchema;
use super::{LoadReport, Warehouse};
use crate::auth::TokenProvider;
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::models::ProductRow;
use crate::upload::multipart_related;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// BigQuery client bound to one destination table
pub struct BigQueryWarehouse {
    client: reqwest::Client,
    tokens: Arc<TokenProvider>,
    endpoint: String,
    project_id: String,
    dataset: String,
    table: String,
    location: String,
    poll_interval: Duration,
    load_timeout: Duration,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    #[serde(default)]
    status: JobStatus,
    statistics: Option<JobStatistics>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    state: String,
    error_result: Option<ErrorProto>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct JobStatistics {
    load: Option<LoadStatistics>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadStatistics {
    /// int64 values arrive as JSON strings
    output_rows: Option<String>,
}

/// `None` while the job is running, the loaded row count once it is done
fn job_outcome(job_id: &str, job: &JobResource) -> Result<Option<u64>> {
    if job.status.state != "DONE" {
        return Ok(None);
    }

    if let Some(error) = &job.status.error_result {
        let details = job
            .status
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .filter(|m| !m.is_empty())
            .collect::<Vec<_>>()
            .join("; ");
        let message = if details.is_empty() {
            format!("{}: {}", error.reason, error.message)
        } else {
            format!("{}: {} ({})", error.reason, error.message, details)
        };
        return Err(AppError::LoadJobFailed {
            job_id: job_id.to_string(),
            message,
        });
    }

    let rows = job
        .statistics
        .as_ref()
        .and_then(|s| s.load.as_ref())
        .and_then(|l| l.output_rows.as_deref())
        .and_then(|r| r.parse().ok())
        .unwrap_or(0);
    Ok(Some(rows))
}

/// Rows as newline-delimited JSON
fn encode_ndjson(rows: &[ProductRow]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(rows.len() * 256);
    for row in rows {
        serde_json::to_writer(&mut buf, row)?;
        buf.push(b'\n');
    }
    Ok(buf)
}

impl BigQueryWarehouse {
    pub fn new(client: reqwest::Client, tokens: Arc<TokenProvider>, config: &AppConfig) -> Self {
        Self {
            client,
            tokens,
            endpoint: config.gcp.bigquery_endpoint.trim_end_matches('/').to_string(),
            project_id: config.gcp.project_id.clone(),
            dataset: config.warehouse.dataset.clone(),
            table: config.warehouse.table.clone(),
            location: config.gcp.location.clone(),
            poll_interval: config.load_poll_interval(),
            load_timeout: config.load_timeout(),
        }
    }

    fn table_reference(&self) -> serde_json::Value {
        json!({
            "projectId": self.project_id,
            "datasetId": self.dataset,
            "tableId": self.table,
        })
    }

    /// POST a create request; `409 Conflict` counts as success.
    ///
    /// Returns `true` when the resource was created by this call.
    async fn create_if_absent(&self, url: &str, body: &serde_json::Value, what: &str) -> Result<bool> {
        let token = self.tokens.token().await?;
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Warehouse {
                message: format!("Failed to create {}: {}", what, e),
            })?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::CONFLICT => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AppError::Warehouse {
                    message: format!("Failed to create {} ({}): {}", what, status, body),
                })
            }
        }
    }

    async fn ensure_dataset(&self) -> Result<()> {
        let url = format!("{}/bigquery/v2/projects/{}/datasets", self.endpoint, self.project_id);
        let body = json!({
            "datasetReference": {
                "projectId": self.project_id,
                "datasetId": self.dataset,
            },
            "location": self.location,
        });

        if self.create_if_absent(&url, &body, "dataset").await? {
            info!(dataset = %self.dataset, location = %self.location, "Dataset created");
        } else {
            debug!(dataset = %self.dataset, "Dataset already exists");
        }
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<JobResource> {
        let url = format!(
            "{}/bigquery/v2/projects/{}/jobs/{}",
            self.endpoint, self.project_id, job_id
        );
        let token = self.tokens.token().await?;
        let response = self
            .client
            .get(&url)
            .query(&[("location", self.location.as_str())])
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Warehouse {
                message: format!("Failed to read job {} ({}): {}", job_id, status, body),
            });
        }

        Ok(response.json().await?)
    }

    async fn wait_for_job(&self, job_id: &str, mut job: JobResource) -> Result<u64> {
        let deadline = tokio::time::Instant::now() + self.load_timeout;
        loop {
            if let Some(rows) = job_outcome(job_id, &job)? {
                return Ok(rows);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AppError::LoadJobTimeout {
                    job_id: job_id.to_string(),
                    timeout_secs: self.load_timeout.as_secs(),
                });
            }
            debug!(job_id, state = %job.status.state, "Load job pending");
            tokio::time::sleep(self.poll_interval).await;
            job = self.get_job(job_id).await?;
        }
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    #[instrument(skip(self, schema), fields(table = %self.table_id()))]
    async fn ensure_table(&self, schema: &TableSchema) -> Result<()> {
        self.ensure_dataset().await?;

        let url = format!(
            "{}/bigquery/v2/projects/{}/datasets/{}/tables",
            self.endpoint, self.project_id, self.dataset
        );
        let body = json!({
            "tableReference": self.table_reference(),
            "schema": schema,
        });

        if self.create_if_absent(&url, &body, "table").await? {
            info!(fields = schema.fields.len(), "Table created");
        } else {
            debug!("Table already exists");
        }
        Ok(())
    }

    #[instrument(skip(self, rows), fields(table = %self.table_id(), rows = rows.len()))]
    async fn bulk_load(&self, rows: &[ProductRow]) -> Result<LoadReport> {
        if rows.is_empty() {
            warn!("No rows to load, skipping load job");
            return Ok(LoadReport {
                job_id: None,
                rows_loaded: 0,
            });
        }

        let job_id = format!("catalog_prep_{}", Uuid::new_v4().simple());
        let metadata = json!({
            "jobReference": {
                "projectId": self.project_id,
                "jobId": job_id,
                "location": self.location,
            },
            "configuration": {
                "load": {
                    "destinationTable": self.table_reference(),
                    "sourceFormat": "NEWLINE_DELIMITED_JSON",
                    "writeDisposition": "WRITE_APPEND",
                    "createDisposition": "CREATE_NEVER",
                    "schema": ProductRow::schema(),
                }
            }
        });
        let payload = encode_ndjson(rows)?;
        let related = multipart_related(&metadata, "application/octet-stream", &payload)?;

        let url = format!(
            "{}/upload/bigquery/v2/projects/{}/jobs",
            self.endpoint, self.project_id
        );
        let token = self.tokens.token().await?;
        let response = self
            .client
            .post(&url)
            .query(&[("uploadType", "multipart")])
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, related.content_type)
            .body(related.body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LoadJobFailed {
                job_id,
                message: format!("Job insert rejected ({}): {}", status, body),
            });
        }

        let job: JobResource = response.json().await?;
        info!(job_id = %job_id, bytes = payload.len(), "Load job submitted");

        let rows_loaded = self.wait_for_job(&job_id, job).await?;
        info!(job_id = %job_id, rows_loaded, "Load job done");

        Ok(LoadReport {
            job_id: Some(job_id),
            rows_loaded,
        })
    }

    fn table_id(&self) -> String {
        format!("{}.{}.{}", self.project_id, self.dataset, self.table)
    }
}
