//! Credentials for the Natural Language API
//!
//! Supported sources:
//! - `api_key` - sent as the `key` query parameter
//! - `access_token` - a ready OAuth bearer token
//! - `service_account_file` - a service account JSON key, exchanged for an
//!   access token with a signed JWT assertion
//! - `auto_detect` - `GOOGLE_API_KEY`, then `GOOGLE_APPLICATION_CREDENTIALS`

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::error::{Error, Result};

/// OAuth scope for the Natural Language API
pub const LANGUAGE_SCOPE: &str = "https://www.googleapis.com/auth/cloud-language";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN_SECS: i64 = 60;

/// Where credentials come from, as written in `langweave.yaml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialsConfig {
    /// Use `GOOGLE_API_KEY` or `GOOGLE_APPLICATION_CREDENTIALS`
    #[default]
    #[serde(alias = "auto-detect")]
    AutoDetect,
    /// API key
    ApiKey(String),
    /// OAuth access token
    AccessToken(String),
    /// Path to a service account JSON key
    ServiceAccountFile(PathBuf),
}

impl CredentialsConfig {
    /// Resolve into usable credentials, reading key files as needed
    pub fn resolve(&self) -> Result<Credentials> {
        match self {
            Self::ApiKey(key) if key.is_empty() => Err(Error::Credentials {
                message: "api_key is empty".to_string(),
            }),
            Self::ApiKey(key) => Ok(Credentials::ApiKey(key.clone())),
            Self::AccessToken(token) => Ok(Credentials::AccessToken(token.clone())),
            Self::ServiceAccountFile(path) => {
                let key = ServiceAccountKey::from_file(path)?;
                Ok(Credentials::ServiceAccount(ServiceAccountTokenSource::new(key)))
            }
            Self::AutoDetect => Self::detect(
                std::env::var("GOOGLE_API_KEY").ok(),
                std::env::var("GOOGLE_APPLICATION_CREDENTIALS").ok(),
            ),
        }
    }

    fn detect(api_key: Option<String>, credentials_file: Option<String>) -> Result<Credentials> {
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            tracing::debug!("Using API key from GOOGLE_API_KEY");
            return Ok(Credentials::ApiKey(key));
        }
        if let Some(path) = credentials_file.filter(|p| !p.is_empty()) {
            tracing::debug!("Using service account from GOOGLE_APPLICATION_CREDENTIALS");
            let key = ServiceAccountKey::from_file(Path::new(&path))?;
            return Ok(Credentials::ServiceAccount(ServiceAccountTokenSource::new(
                key,
            )));
        }
        Err(Error::Credentials {
            message: "no credentials found: set GOOGLE_API_KEY or GOOGLE_APPLICATION_CREDENTIALS, \
                      or configure api.credentials"
                .to_string(),
        })
    }
}

/// Resolved credentials
#[derive(Debug)]
pub enum Credentials {
    /// API key, sent as a query parameter
    ApiKey(String),
    /// Bearer token
    AccessToken(String),
    /// Service account; tokens are minted on demand
    ServiceAccount(ServiceAccountTokenSource),
}

impl Credentials {
    /// Attach credentials to a request
    pub async fn authorize(
        &self,
        http: &reqwest::Client,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder> {
        match self {
            Self::ApiKey(key) => Ok(request.query(&[("key", key)])),
            Self::AccessToken(token) => Ok(request.bearer_auth(token)),
            Self::ServiceAccount(source) => {
                let token = source.token(http).await?;
                Ok(request.bearer_auth(token))
            }
        }
    }
}

/// The fields of a service account JSON key that are needed to mint tokens
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    /// Service account email, the JWT issuer
    pub client_email: String,
    /// PEM encoded RSA private key
    pub private_key: String,
    /// Key id, sent as the JWT `kid`
    #[serde(default)]
    pub private_key_id: Option<String>,
    /// OAuth token endpoint
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    /// Read a service account key file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::Credentials {
            message: format!(
                "cannot read credentials from service account key file '{}': {}",
                path.display(),
                e
            ),
        })?;
        serde_json::from_str(&contents).map_err(|e| Error::Credentials {
            message: format!(
                "invalid service account key file '{}': {}",
                path.display(),
                e
            ),
        })
    }

    /// Build a signed JWT assertion for the token endpoint
    pub fn assertion(&self, issued_at: i64) -> Result<String> {
        #[derive(Serialize)]
        struct Claims<'a> {
            iss: &'a str,
            scope: &'a str,
            aud: &'a str,
            iat: i64,
            exp: i64,
        }

        let claims = Claims {
            iss: &self.client_email,
            scope: LANGUAGE_SCOPE,
            aud: &self.token_uri,
            iat: issued_at,
            exp: issued_at + TOKEN_LIFETIME_SECS,
        };
        let header = Header {
            kid: self.private_key_id.clone(),
            ..Header::new(Algorithm::RS256)
        };
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes()).map_err(|e| {
            Error::Credentials {
                message: format!("invalid private key for {}: {}", self.client_email, e),
            }
        })?;
        jsonwebtoken::encode(&header, &claims, &key).map_err(|e| Error::Credentials {
            message: format!("failed to sign token request: {}", e),
        })
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Mints and caches access tokens for a service account
#[derive(Debug)]
pub struct ServiceAccountTokenSource {
    key: ServiceAccountKey,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokenSource {
    /// Create a token source for a key
    pub fn new(key: ServiceAccountKey) -> Self {
        Self {
            key,
            cached: Mutex::new(None),
        }
    }

    /// A valid access token, fetched when missing or close to expiry.
    ///
    /// A key that cannot be signed is a credentials error; failures talking
    /// to the token endpoint are service errors, like any other failed call.
    pub async fn token(&self, http: &reqwest::Client) -> Result<String> {
        let mut cached = self.cached.lock().await;
        let now = chrono::Utc::now().timestamp();
        if let Some(token) = cached.as_ref()
            && token.expires_at - REFRESH_MARGIN_SECS > now
        {
            return Ok(token.token.clone());
        }

        tracing::debug!(
            "Requesting access token for {} from {}",
            self.key.client_email,
            self.key.token_uri
        );
        let assertion = self.key.assertion(now)?;
        let response = http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| Error::Service {
                status: e.status().map(|s| s.as_u16()),
                message: format!("token request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Service {
                status: Some(status.as_u16()),
                message: format!("token endpoint returned {}: {}", status, body),
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| Error::Service {
            status: Some(status.as_u16()),
            message: format!("invalid token response: {}", e),
        })?;
        let expires_at = now + token.expires_in.unwrap_or(TOKEN_LIFETIME_SECS);
        *cached = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at,
        });
        Ok(token.access_token)
    }
}
