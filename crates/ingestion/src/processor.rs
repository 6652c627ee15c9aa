//! Batch processor
//!
//! Turns input records into warehouse rows: product id, optional discrepancy,
//! mirrored image. Records are handled in input order against one seeded random
//! stream so a given input and seed always yields the same ids and texts. Image
//! fetch failures and storage rejections are record-scoped; credential failures
//! and a failed load fail the whole batch.

use crate::discrepancy::DiscrepancyInjector;
use crate::errors::IngestionError;
use crate::image::{ImageMirror, MirrorError};
use crate::product_id::ProductId;
use crate::records::InputRecord;
use catalog_prep_common::config::AppConfig;
use catalog_prep_common::metrics;
use catalog_prep_common::models::ProductRow;
use catalog_prep_common::warehouse::Warehouse;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Result of one batch run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub table_id: String,
    /// Rows built from the input
    pub rows: usize,
    /// Rows committed by the load job
    pub rows_loaded: u64,
    /// Rows kept without a mirrored image
    pub missing_images: usize,
    /// Rows flagged with an injected discrepancy
    pub discrepancies: usize,
    pub job_id: Option<String>,
}

/// Batch processor
pub struct BatchProcessor {
    injector: DiscrepancyInjector,
    mirror: ImageMirror,
    warehouse: Arc<dyn Warehouse>,
    seed: u64,
}

impl BatchProcessor {
    pub fn new(
        injector: DiscrepancyInjector,
        mirror: ImageMirror,
        warehouse: Arc<dyn Warehouse>,
        seed: u64,
    ) -> Self {
        Self {
            injector,
            mirror,
            warehouse,
            seed,
        }
    }

    /// Injector settings and seed come from `[ingest]`
    pub fn from_config(config: &AppConfig, mirror: ImageMirror, warehouse: Arc<dyn Warehouse>) -> Self {
        let injector = DiscrepancyInjector::new(
            config.ingest.discrepancy_rate,
            config.ingest.toggle_miss_policy,
        );
        Self::new(injector, mirror, warehouse, config.ingest.random_seed)
    }

    /// Build one row per record, in input order
    pub async fn build_rows(&self, records: &[InputRecord]) -> Result<Vec<ProductRow>, IngestionError> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut rows = Vec::with_capacity(records.len());

        for record in records {
            rows.push(self.process_record(record, &mut rng).await?);
        }

        Ok(rows)
    }

    /// Build the row for a single record
    ///
    /// Random draws happen before the image fetch, so network outcomes never
    /// shift the stream seen by later records.
    pub async fn process_record<R: Rng + Send>(
        &self,
        record: &InputRecord,
        rng: &mut R,
    ) -> Result<ProductRow, IngestionError> {
        let product_id = ProductId::from_name(&record.item_name);
        let injection = self.injector.apply(&record.marketing_text, rng);
        let injected = injection.perturbation.is_injected();

        metrics::record_row(injected.then(|| injection.perturbation.kind()));
        if injected {
            debug!(
                product_id = %product_id,
                kind = injection.perturbation.kind(),
                "Discrepancy injected"
            );
        }

        let image_gcs_uri = if record.has_image() {
            let started = Instant::now();
            match self.mirror.mirror(&record.image, &product_id).await {
                Ok(mirrored) => {
                    metrics::record_image(started.elapsed().as_secs_f64(), None);
                    Some(mirrored.uri)
                }
                Err(e) => {
                    metrics::record_image(started.elapsed().as_secs_f64(), Some(e.reason()));
                    // Only record-scoped failures keep the row
                    match e {
                        MirrorError::Upload(app) if !app.is_record_scoped() => return Err(app.into()),
                        e => warn!(
                            product_id = %product_id,
                            url = %record.image,
                            reason = e.reason(),
                            error = %e,
                            "Image mirror failed, keeping row without image"
                        ),
                    }
                    None
                }
            }
        } else {
            None
        };

        Ok(ProductRow {
            product_id: product_id.into_string(),
            product_name: record.item_name.clone(),
            marketing_text: injection.text,
            image_gcs_uri,
            source_image_url: record.image.clone(),
            has_injected_discrepancy: injected,
            ingested_at: Utc::now(),
        })
    }

    /// Ensure the table, build every row, then load them in one job
    #[instrument(skip(self, records), fields(records = records.len(), seed = self.seed))]
    pub async fn run(&self, records: &[InputRecord]) -> Result<BatchSummary, IngestionError> {
        let table_id = self.warehouse.table_id();
        self.warehouse.ensure_table(&ProductRow::schema()).await?;

        let rows = self.build_rows(records).await?;
        let missing_images = rows.iter().filter(|row| !row.has_image()).count();
        let discrepancies = rows.iter().filter(|row| row.has_injected_discrepancy).count();

        info!(
            rows = rows.len(),
            missing_images,
            discrepancies,
            "Rows built, starting load"
        );

        let started = Instant::now();
        let report = self.warehouse.bulk_load(&rows).await?;
        metrics::record_load(started.elapsed().as_secs_f64(), report.rows_loaded);

        info!(
            table = %table_id,
            job_id = ?report.job_id,
            rows_loaded = report.rows_loaded,
            "Load complete"
        );

        Ok(BatchSummary {
            table_id,
            rows: rows.len(),
            rows_loaded: report.rows_loaded,
            missing_images,
            discrepancies,
            job_id: report.job_id,
        })
    }
}
