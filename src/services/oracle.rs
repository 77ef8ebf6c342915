use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::models::verification::{EmailVerification, VerifyOptions};

/// Per-email verification capability. Syntax, DNS and SMTP checks happen
/// behind this seam.
#[async_trait]
pub trait VerificationOracle: Send + Sync {
    async fn verify(
        &self,
        email: &str,
        options: &VerifyOptions,
    ) -> Result<EmailVerification, OracleError>;
}

/// HTTP client for the remote verification service.
pub struct HttpVerificationClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest<'a> {
    email: &'a str,
    #[serde(flatten)]
    options: &'a VerifyOptions,
}

impl HttpVerificationClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, OracleError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(OracleError::from)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl VerificationOracle for HttpVerificationClient {
    async fn verify(
        &self,
        email: &str,
        options: &VerifyOptions,
    ) -> Result<EmailVerification, OracleError> {
        let url = format!("{}/v1/verify", self.base_url);

        let mut request = self
            .http
            .post(&url)
            .json(&VerifyRequest { email, options });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(OracleError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Status(status.as_u16()));
        }

        response.json().await.map_err(OracleError::from)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("Verification service returned status {0}")]
    Status(u16),

    #[error("Verification service unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            OracleError::Unavailable(err.to_string())
        } else {
            OracleError::Http(err)
        }
    }
}
