//! Google Cloud credential resolution
//!
//! Provides:
//! - Static access tokens (operator supplied, or local emulators)
//! - Service account keys exchanged via a signed JWT assertion
//! - GCE metadata server tokens
//! - Token caching with early refresh

use crate::config::GcpConfig;
use crate::errors::{AppError, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// OAuth2 scope requested for every token
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Refresh this long before the reported expiry
const REFRESH_MARGIN_SECS: i64 = 60;

/// Service account key file (the subset of fields needed to mint tokens)
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    /// Read a key file from disk
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| AppError::Auth {
            message: format!("Failed to read credentials {}: {}", path.display(), e),
        })?;
        serde_json::from_str(&raw).map_err(|e| AppError::Auth {
            message: format!("Invalid credentials file {}: {}", path.display(), e),
        })
    }
}

/// JWT assertion claims for the token exchange
#[derive(Debug, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Where access tokens come from
enum CredentialSource {
    Static(String),
    ServiceAccount {
        key: ServiceAccountKey,
        encoding_key: EncodingKey,
    },
    MetadataServer {
        endpoint: String,
    },
}

impl CredentialSource {
    fn kind(&self) -> &'static str {
        match self {
            CredentialSource::Static(_) => "static",
            CredentialSource::ServiceAccount { .. } => "service_account",
            CredentialSource::MetadataServer { .. } => "metadata_server",
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

/// Resolves and caches OAuth2 access tokens
pub struct TokenProvider {
    client: reqwest::Client,
    source: CredentialSource,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    /// Pick a credential source from configuration.
    ///
    /// Order: static token, service account key file, metadata server.
    pub fn from_config(gcp: &GcpConfig) -> Result<Self> {
        let source = if let Some(token) = gcp.access_token.clone().filter(|t| !t.is_empty()) {
            CredentialSource::Static(token)
        } else if let Some(path) = gcp.credentials_path.as_deref() {
            let key = ServiceAccountKey::from_file(path)?;
            let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
            CredentialSource::ServiceAccount { key, encoding_key }
        } else {
            CredentialSource::MetadataServer {
                endpoint: gcp.metadata_endpoint.trim_end_matches('/').to_string(),
            }
        };

        info!(source = source.kind(), "Credential source selected");

        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()?,
            source,
            cached: Mutex::new(None),
        })
    }

    /// Provider that always hands out the same token
    pub fn static_token(token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            source: CredentialSource::Static(token.into()),
            cached: Mutex::new(None),
        }
    }

    /// Name of the active credential source
    pub fn source_kind(&self) -> &'static str {
        self.source.kind()
    }

    /// Current access token, minting a new one when the cached token is near expiry
    pub async fn token(&self) -> Result<String> {
        if let CredentialSource::Static(token) = &self.source {
            return Ok(token.clone());
        }

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.access_token.clone());
        }

        let fresh = self.fetch().await?;
        debug!(expires_at = %fresh.expires_at, "Access token refreshed");
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    async fn fetch(&self) -> Result<CachedToken> {
        let response = match &self.source {
            CredentialSource::Static(token) => {
                return Ok(CachedToken {
                    access_token: token.clone(),
                    expires_at: DateTime::<Utc>::MAX_UTC,
                })
            }
            CredentialSource::ServiceAccount { key, encoding_key } => {
                let assertion = sign_assertion(key, encoding_key, Utc::now())?;
                self.client
                    .post(&key.token_uri)
                    .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
                    .send()
                    .await
            }
            CredentialSource::MetadataServer { endpoint } => {
                let url = format!(
                    "{}/computeMetadata/v1/instance/service-accounts/default/token",
                    endpoint
                );
                self.client
                    .get(&url)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
            }
        }
        .map_err(|e| AppError::Auth {
            message: format!("Token request failed: {}", e),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Auth {
                message: format!("Token endpoint returned {}: {}", status, body),
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| AppError::Auth {
            message: format!("Failed to parse token response: {}", e),
        })?;

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        })
    }
}

fn sign_assertion(
    key: &ServiceAccountKey,
    encoding_key: &EncodingKey,
    now: DateTime<Utc>,
) -> Result<String> {
    let claims = AssertionClaims {
        iss: key.client_email.clone(),
        scope: CLOUD_PLATFORM_SCOPE.to_string(),
        aud: key.token_uri.clone(),
        iat: now.timestamp(),
        exp: (now + Duration::hours(1)).timestamp(),
    };

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    Ok(encode(&header, &claims, encoding_key)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn gcp_config() -> GcpConfig {
        GcpConfig {
            project_id: "demo-project".to_string(),
            location: "europe-north1".to_string(),
            credentials_path: None,
            access_token: None,
            storage_endpoint: "https://storage.googleapis.com".to_string(),
            bigquery_endpoint: "https://bigquery.googleapis.com".to_string(),
            metadata_endpoint: "http://metadata.google.internal/".to_string(),
        }
    }

    #[tokio::test]
    async fn test_static_token_wins() {
        let mut gcp = gcp_config();
        gcp.access_token = Some("ya29.token".to_string());
        gcp.credentials_path = Some("/does/not/exist.json".into());

        let provider = TokenProvider::from_config(&gcp).unwrap();
        assert_eq!(provider.source_kind(), "static");
        assert_eq!(provider.token().await.unwrap(), "ya29.token");
    }

    #[test]
    fn test_falls_back_to_metadata_server() {
        let provider = TokenProvider::from_config(&gcp_config()).unwrap();
        assert_eq!(provider.source_kind(), "metadata_server");
    }

    #[test]
    fn test_missing_key_file_is_auth_error() {
        let mut gcp = gcp_config();
        gcp.credentials_path = Some("/does/not/exist.json".into());
        let err = TokenProvider::from_config(&gcp).err().unwrap();
        assert!(matches!(err, AppError::Auth { .. }));
    }

    #[test]
    fn test_malformed_private_key_is_auth_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"client_email":"loader@demo-project.iam.gserviceaccount.com","private_key":"not a pem"}}"#
        )
        .unwrap();

        let mut gcp = gcp_config();
        gcp.credentials_path = Some(file.path().to_path_buf());
        let err = TokenProvider::from_config(&gcp).err().unwrap();
        assert!(matches!(err, AppError::Auth { .. }));
    }

    #[test]
    fn test_key_file_defaults_token_uri() {
        let key: ServiceAccountKey = serde_json::from_str(
            r#"{"client_email":"a@b.iam.gserviceaccount.com","private_key":"pem"}"#,
        )
        .unwrap();
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
        assert!(key.private_key_id.is_none());
    }

    #[test]
    fn test_cached_token_freshness() {
        let now = Utc::now();
        let token = CachedToken {
            access_token: "t".to_string(),
            expires_at: now + Duration::seconds(30),
        };
        assert!(!token.is_fresh(now));

        let token = CachedToken {
            access_token: "t".to_string(),
            expires_at: now + Duration::seconds(600),
        };
        assert!(token.is_fresh(now));
    }
}
