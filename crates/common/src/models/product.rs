//! Product row entity

use crate::warehouse::schema::{FieldMode, FieldSpec, FieldType, TableSchema};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// One flattened product as loaded into the warehouse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRow {
    pub product_id: String,

    pub product_name: String,

    /// Marketing copy, possibly carrying an injected discrepancy
    pub marketing_text: String,

    /// Mirrored image, `None` when the record had no image or mirroring failed
    pub image_gcs_uri: Option<String>,

    pub source_image_url: String,

    /// Ground truth for the injected-discrepancy label
    pub has_injected_discrepancy: bool,

    #[serde(serialize_with = "serialize_timestamp")]
    pub ingested_at: DateTime<Utc>,
}

/// Second precision, `Z` suffix: `2024-05-01T12:00:00Z`
fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true))
}

impl ProductRow {
    /// Destination table schema
    pub fn schema() -> TableSchema {
        TableSchema::new(vec![
            FieldSpec::new("product_id", FieldType::String, FieldMode::Required),
            FieldSpec::new("product_name", FieldType::String, FieldMode::Nullable),
            FieldSpec::new("marketing_text", FieldType::String, FieldMode::Nullable),
            FieldSpec::new("image_gcs_uri", FieldType::String, FieldMode::Nullable),
            FieldSpec::new("source_image_url", FieldType::String, FieldMode::Nullable),
            FieldSpec::new("has_injected_discrepancy", FieldType::Boolean, FieldMode::Nullable),
            FieldSpec::new("ingested_at", FieldType::Timestamp, FieldMode::Nullable),
        ])
    }

    pub fn has_image(&self) -> bool {
        self.image_gcs_uri.is_some()
    }
}
