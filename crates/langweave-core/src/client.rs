//! Natural Language API client
//!
//! [`LanguageClient`] is the seam between the transform and the network. The
//! HTTP implementation posts JSON to the v1 REST API; tests and embedders can
//! supply their own implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::analysis::{AnalysisKind, Document, EncodingType};
use crate::auth::{Credentials, CredentialsConfig};
use crate::error::{Error, Result};

/// Default REST endpoint
pub const DEFAULT_ENDPOINT: &str = "https://language.googleapis.com/v1";

/// Executes analyses against the Natural Language API
#[async_trait]
pub trait LanguageClient: Send + Sync {
    /// Run one analysis and return the raw JSON response
    async fn execute(
        &self,
        kind: &AnalysisKind,
        document: &Document,
        encoding: EncodingType,
    ) -> Result<Value>;
}

/// API connection settings from `langweave.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the REST API
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Credential source
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            credentials: CredentialsConfig::default(),
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Error envelope returned by Google APIs
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// [`LanguageClient`] over the REST API
#[derive(Debug)]
pub struct HttpLanguageClient {
    http: reqwest::Client,
    endpoint: String,
    credentials: Credentials,
}

impl HttpLanguageClient {
    /// Create a client from API settings, resolving credentials once
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        let credentials = config.credentials.resolve()?;
        Self::new(&config.endpoint, credentials, Duration::from_secs(config.timeout_secs))
    }

    /// Create a client with explicit credentials
    pub fn new(endpoint: &str, credentials: Credentials, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Service {
                status: None,
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn method_url(&self, kind: &AnalysisKind) -> String {
        format!("{}/documents:{}", self.endpoint, kind.rest_method())
    }
}

#[async_trait]
impl LanguageClient for HttpLanguageClient {
    async fn execute(
        &self,
        kind: &AnalysisKind,
        document: &Document,
        encoding: EncodingType,
    ) -> Result<Value> {
        let url = self.method_url(kind);
        tracing::debug!(method = kind.rest_method(), "Calling {}", url);

        let request = self
            .http
            .post(&url)
            .json(&kind.request_body(document, encoding));
        let response = self
            .credentials
            .authorize(&self.http, request)
            .await?
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Service {
                status: Some(status.as_u16()),
                message: service_message(&body),
            });
        }

        let value: Value = response.json().await?;
        Ok(value)
    }
}

fn service_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.status {
            Some(status) => format!("{}: {}", status, envelope.error.message),
            None => envelope.error.message,
        },
        Err(_) if body.is_empty() => "empty response body".to_string(),
        Err(_) => body.to_string(),
    }
}
