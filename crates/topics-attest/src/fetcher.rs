//! Network access — attestation documents and script bodies.
//!
//! Not a browser, just single GET requests with a bounded timeout. Nothing is
//! retried: every failure is reported as a [`FetchError`] and callers fold it
//! into a negative outcome.

use std::time::Duration;

use async_trait::async_trait;

use crate::document::{AttestationDocument, WELL_KNOWN_PATH};
use crate::domain::Domain;
use crate::types::FetchError;

/// Default timeout for every outbound request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/126.0.0.0 Safari/537.36";

/// Fetches and parses the attestation document published by a domain.
#[async_trait]
pub trait AttestationFetcher: Send + Sync {
    async fn fetch(&self, domain: &Domain) -> Result<AttestationDocument, FetchError>;
}

/// Fetches the body of a script observed in a crawl.
#[async_trait]
pub trait ScriptFetcher: Send + Sync {
    async fn fetch_script(&self, url: &str) -> Result<String, FetchError>;
}

/// reqwest-backed implementation of both fetch operations.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    scheme: String,
}

impl HttpFetcher {
    /// Create a fetcher with the given per-request timeout.
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            scheme: "https".to_string(),
        }
    }

    /// Use another scheme for document URLs (plain `http` for local servers).
    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_string();
        self
    }

    /// URL of the attestation document for `domain`.
    pub fn document_url(&self, domain: &Domain) -> String {
        format!("{}://{}{}", self.scheme, domain, WELL_KNOWN_PATH)
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        if !resp.status().is_success() {
            return Err(FetchError::Protocol {
                url: url.to_string(),
                reason: format!("status {}", resp.status().as_u16()),
            });
        }
        Ok(resp)
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl AttestationFetcher for HttpFetcher {
    async fn fetch(&self, domain: &Domain) -> Result<AttestationDocument, FetchError> {
        let url = self.document_url(domain);
        let resp = self.get(&url).await?;

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !content_type.contains("application/json") {
            return Err(FetchError::Protocol {
                url,
                reason: format!("unexpected content-type {content_type:?}"),
            });
        }

        let body = resp.text().await.map_err(|source| FetchError::Transport {
            url: url.clone(),
            source,
        })?;
        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| FetchError::Parse {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        Ok(AttestationDocument::from_value(value))
    }
}

#[async_trait]
impl ScriptFetcher for HttpFetcher {
    async fn fetch_script(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.get(url).await?;
        resp.text().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })
    }
}
