//! Catalog Prep Common Library
//!
//! Shared code for the catalog prep tooling including:
//! - Configuration management
//! - Error types and handling
//! - Google Cloud credentials
//! - Object storage and warehouse abstractions with GCP implementations
//! - Warehouse row models
//! - Metrics and observability

pub mod auth;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod storage;
pub mod upload;
pub mod warehouse;

#[cfg(test)]
mod test_server;

// Re-export commonly used types
pub use auth::TokenProvider;
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use models::ProductRow;
pub use storage::ObjectStore;
pub use warehouse::Warehouse;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
