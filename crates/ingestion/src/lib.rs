//! Catalog Prep Ingestion
//!
//! Prepares product records for the warehouse:
//! 1. Derives a deterministic product id from the display name
//! 2. Injects labelled discrepancies into a share of the marketing texts
//! 3. Mirrors source images into object storage
//! 4. Loads the rows into the warehouse in one job

pub mod discrepancy;
pub mod errors;
pub mod image;
pub mod processor;
pub mod product_id;
pub mod records;

pub use errors::IngestionError;
pub use processor::{BatchProcessor, BatchSummary};
pub use product_id::ProductId;
pub use records::InputRecord;
