//! Tri-state, write-once attestation cache.
//!
//! Every backend presents the same contract: `get` returns
//! [`CacheEntry::Unknown`] until the first `put` for a domain, and the first
//! `put` wins forever after.

pub mod memory;
pub mod remote;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::Domain;
use crate::types::{AttestationEntry, AttestationRecord, CacheEntry, CacheError};

pub use memory::MemoryCache;
pub use remote::RemoteCache;
pub use sqlite::SqliteCache;

/// Domain-keyed attestation cache.
#[async_trait]
pub trait AttestationCache: Send + Sync {
    /// Look up a domain. `Unknown` when it was never written.
    async fn get(&self, domain: &Domain) -> Result<CacheEntry, CacheError>;

    /// Record the outcome for a domain: `Some` → positive, `None` → negative.
    /// A no-op when the domain already has an outcome.
    async fn put(&self, domain: &Domain, record: Option<&AttestationRecord>) -> Result<(), CacheError>;
}

/// A cache that remembers nothing. Resolution stays correct, only slower.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

#[async_trait]
impl AttestationCache for NoCache {
    async fn get(&self, _domain: &Domain) -> Result<CacheEntry, CacheError> {
        Ok(CacheEntry::Unknown)
    }

    async fn put(&self, _domain: &Domain, _record: Option<&AttestationRecord>) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Stored form of a cache outcome, shared by the SQLite table and the cache
/// service wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAttestation {
    pub attested: bool,
    #[serde(default)]
    pub attestation_result: Option<Value>,
}

impl CachedAttestation {
    pub fn from_record(record: Option<&AttestationRecord>) -> Result<Self, CacheError> {
        Ok(match record {
            Some(r) => Self {
                attested: true,
                attestation_result: Some(serde_json::to_value(&r.attestations)?),
            },
            None => Self {
                attested: false,
                attestation_result: None,
            },
        })
    }

    /// Rebuild the tri-state value for `domain`.
    pub fn into_entry(self, domain: &Domain) -> Result<CacheEntry, CacheError> {
        if !self.attested {
            return Ok(CacheEntry::Negative);
        }
        let attestations: Vec<AttestationEntry> =
            serde_json::from_value(self.attestation_result.unwrap_or(Value::Null))?;
        Ok(CacheEntry::Positive(AttestationRecord {
            domain: domain.to_string(),
            attestations,
        }))
    }
}
