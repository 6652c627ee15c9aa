//! Warehouse sink abstraction
//!
//! Provides:
//! - The `Warehouse` trait: idempotent table creation and one-shot bulk load
//! - A BigQuery implementation (REST, load jobs)
//! - An in-memory warehouse for testing

pub mod bigquery;
pub mod schema;

use crate::errors::{AppError, Result};
use crate::models::ProductRow;
use async_trait::async_trait;
use schema::TableSchema;
use std::sync::Mutex;

pub use bigquery::BigQueryWarehouse;

/// Outcome of a bulk load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// Load job id, `None` when nothing was submitted
    pub job_id: Option<String>,
    pub rows_loaded: u64,
}

/// Trait for the destination table
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Create the dataset and table if absent; existing ones are left alone
    async fn ensure_table(&self, schema: &TableSchema) -> Result<()>;

    /// Load all rows in a single job; either every row lands or the call fails
    async fn bulk_load(&self, rows: &[ProductRow]) -> Result<LoadReport>;

    /// Fully qualified table id for reporting
    fn table_id(&self) -> String;
}

#[derive(Default)]
struct MemoryTables {
    schema: Option<TableSchema>,
    loads: Vec<Vec<ProductRow>>,
}

/// In-memory warehouse for testing
pub struct MemoryWarehouse {
    table_id: String,
    fail_loads: bool,
    state: Mutex<MemoryTables>,
}

impl MemoryWarehouse {
    pub fn new(table_id: impl Into<String>) -> Self {
        Self {
            table_id: table_id.into(),
            fail_loads: false,
            state: Mutex::new(MemoryTables::default()),
        }
    }

    /// Fail every bulk load, as a rejected load job would
    pub fn failing_loads(mut self) -> Self {
        self.fail_loads = true;
        self
    }

    /// Schema passed to the last `ensure_table`
    pub fn schema(&self) -> Option<TableSchema> {
        self.lock().schema.clone()
    }

    /// Every committed load, in order
    pub fn loads(&self) -> Vec<Vec<ProductRow>> {
        self.lock().loads.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryTables> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn ensure_table(&self, schema: &TableSchema) -> Result<()> {
        self.lock().schema.get_or_insert_with(|| schema.clone());
        Ok(())
    }

    async fn bulk_load(&self, rows: &[ProductRow]) -> Result<LoadReport> {
        let job_id = format!("memory_{}", self.lock().loads.len());
        if self.fail_loads {
            return Err(AppError::LoadJobFailed {
                job_id,
                message: "load rejected".to_string(),
            });
        }
        if self.lock().schema.is_none() {
            return Err(AppError::Warehouse {
                message: format!("Table {} does not exist", self.table_id),
            });
        }
        self.lock().loads.push(rows.to_vec());
        Ok(LoadReport {
            job_id: Some(job_id),
            rows_loaded: rows.len() as u64,
        })
    }

    fn table_id(&self) -> String {
        self.table_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_load_requires_table() {
        let warehouse = MemoryWarehouse::new("p.products.products_raw");
        let err = warehouse.bulk_load(&[]).await.unwrap_err();
        assert!(matches!(err, AppError::Warehouse { .. }));

        warehouse.ensure_table(&ProductRow::schema()).await.unwrap();
        let report = warehouse.bulk_load(&[]).await.unwrap();
        assert_eq!(report.rows_loaded, 0);
        assert_eq!(warehouse.loads().len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_table_is_idempotent() {
        let warehouse = MemoryWarehouse::new("p.products.products_raw");
        let schema = ProductRow::schema();
        warehouse.ensure_table(&schema).await.unwrap();
        warehouse.ensure_table(&schema).await.unwrap();
        assert_eq!(warehouse.schema(), Some(schema));
    }

    #[tokio::test]
    async fn test_failing_loads_commit_nothing() {
        let warehouse = MemoryWarehouse::new("p.products.products_raw").failing_loads();
        warehouse.ensure_table(&ProductRow::schema()).await.unwrap();
        let err = warehouse.bulk_load(&[]).await.unwrap_err();
        assert!(matches!(err, AppError::LoadJobFailed { .. }));
        assert!(warehouse.loads().is_empty());
    }
}
