//! Input records
//!
//! The input is a JSON array of objects. Older exports use `product_name` and
//! `image_url`; a missing, null or empty primary key falls through to its alias.

use crate::errors::IngestionError;
use crate::product_id::DEFAULT_PRODUCT_NAME;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
struct RawRecord {
    item_name: Option<String>,
    product_name: Option<String>,
    marketing_text: Option<String>,
    image: Option<String>,
    image_url: Option<String>,
}

/// One product as supplied by the export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRecord {
    pub item_name: String,
    pub marketing_text: String,
    /// Source image URL, empty when the record has none
    pub image: String,
}

fn first_non_empty(candidates: [Option<String>; 2]) -> Option<String> {
    candidates.into_iter().flatten().find(|v| !v.is_empty())
}

impl From<RawRecord> for InputRecord {
    fn from(raw: RawRecord) -> Self {
        Self {
            item_name: first_non_empty([raw.item_name, raw.product_name])
                .unwrap_or_else(|| DEFAULT_PRODUCT_NAME.to_string()),
            marketing_text: raw.marketing_text.unwrap_or_default(),
            image: first_non_empty([raw.image, raw.image_url]).unwrap_or_default(),
        }
    }
}

impl InputRecord {
    pub fn has_image(&self) -> bool {
        !self.image.is_empty()
    }
}

/// Parse a JSON array of records
pub fn parse_records(json: impl AsRef<[u8]>) -> serde_json::Result<Vec<InputRecord>> {
    let raw: Vec<RawRecord> = serde_json::from_slice(json.as_ref())?;
    Ok(raw.into_iter().map(InputRecord::from).collect())
}

/// Read and parse the input file
pub fn load_records(path: &Path) -> Result<Vec<InputRecord>, IngestionError> {
    // Bytes, so invalid UTF-8 surfaces as a parse error
    let json = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => IngestionError::InputNotFound(path.display().to_string()),
        _ => IngestionError::IoError(e),
    })?;

    let records = parse_records(&json).map_err(|source| IngestionError::InputParse {
        path: path.display().to_string(),
        source,
    })?;

    info!(path = %path.display(), count = records.len(), "Input records loaded");
    Ok(records)
}
