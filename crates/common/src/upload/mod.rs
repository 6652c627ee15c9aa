//! `multipart/related` bodies for Google upload endpoints
//!
//! Both the Cloud Storage object insert and the BigQuery job insert accept a
//! JSON metadata part followed by the media part in one request.

use serde::Serialize;

/// Encoded multipart body together with its `Content-Type` header value
#[derive(Debug, Clone)]
pub struct RelatedBody {
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Build a two-part `multipart/related` body: JSON metadata, then media.
pub fn multipart_related<M: Serialize>(
    metadata: &M,
    media_type: &str,
    media: &[u8],
) -> serde_json::Result<RelatedBody> {
    let boundary = format!("catalog_prep_{}", uuid::Uuid::new_v4().simple());
    let metadata = serde_json::to_vec(metadata)?;

    let mut body = Vec::with_capacity(metadata.len() + media.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(&metadata);
    body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", media_type).as_bytes());
    body.extend_from_slice(media);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    Ok(RelatedBody {
        content_type: format!("multipart/related; boundary={}", boundary),
        body,
    })
}
