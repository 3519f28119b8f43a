//! Client for the shared cache service.
//!
//! `GET /?domain=<d>` answers 200 with the stored outcome or 404 when the
//! domain is unknown; `POST /` stores an outcome and answers 201.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AttestationCache, CachedAttestation};
use crate::domain::Domain;
use crate::types::{AttestationRecord, CacheEntry, CacheError};

/// Body of `POST /` on the cache service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachePutRequest {
    pub domain: Option<String>,
    pub attested: Option<bool>,
    #[serde(default)]
    pub attestation_result: Option<Value>,
}

/// Cache tier living in a separate service shared by many crawler processes.
#[derive(Clone)]
pub struct RemoteCache {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteCache {
    /// Connect to the service at `base_url` (e.g. `http://localhost:8080`).
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: format!("{}/", base_url.trim_end_matches('/')),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check that the service answers on `/health`.
    pub async fn ping(&self) -> Result<(), CacheError> {
        let resp = self
            .client
            .get(format!("{}health", self.base_url))
            .send()
            .await
            .map_err(|e| CacheError::Remote(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(CacheError::Remote(format!(
                "health check answered {}",
                resp.status().as_u16()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AttestationCache for RemoteCache {
    async fn get(&self, domain: &Domain) -> Result<CacheEntry, CacheError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("domain", domain.as_str())])
            .send()
            .await
            .map_err(|e| CacheError::Remote(e.to_string()))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(CacheEntry::Unknown),
            StatusCode::OK => {
                let stored: CachedAttestation = resp
                    .json()
                    .await
                    .map_err(|e| CacheError::Remote(format!("bad cache response: {e}")))?;
                stored.into_entry(domain)
            }
            other => Err(CacheError::Remote(format!(
                "unexpected status {} for {domain}",
                other.as_u16()
            ))),
        }
    }

    async fn put(&self, domain: &Domain, record: Option<&AttestationRecord>) -> Result<(), CacheError> {
        let stored = CachedAttestation::from_record(record)?;
        let body = CachePutRequest {
            domain: Some(domain.to_string()),
            attested: Some(stored.attested),
            attestation_result: stored.attestation_result,
        };

        let resp = self
            .client
            .post(&self.base_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CacheError::Remote(e.to_string()))?;

        if resp.status() != StatusCode::CREATED {
            return Err(CacheError::Remote(format!(
                "unexpected status {} storing {domain}",
                resp.status().as_u16()
            )));
        }
        Ok(())
    }
}
