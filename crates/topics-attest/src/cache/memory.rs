//! Process-local cache tier.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::AttestationCache;
use crate::domain::Domain;
use crate::types::{AttestationRecord, CacheEntry, CacheError};

/// In-memory cache, dropped with the process.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<Domain, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of domains with a known outcome.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AttestationCache for MemoryCache {
    async fn get(&self, domain: &Domain) -> Result<CacheEntry, CacheError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(domain).cloned().unwrap_or(CacheEntry::Unknown))
    }

    async fn put(&self, domain: &Domain, record: Option<&AttestationRecord>) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.entry(domain.clone()).or_insert_with(|| match record {
            Some(r) => CacheEntry::Positive(r.clone()),
            None => CacheEntry::Negative,
        });
        Ok(())
    }
}
