//! Progressive-suffix attestation lookup.
//!
//! For `a.b.example.co.uk` the candidates are tried shortest first:
//! `co.uk`, `example.co.uk`, `b.example.co.uk`, `a.b.example.co.uk`. The
//! first positive outcome wins. Every candidate that was looked at gets an
//! outcome in the cache, so a later lookup never fetches it again.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::allowlist::AllowList;
use crate::cache::AttestationCache;
use crate::document::validate_record;
use crate::domain::{full_domain, suffix_at_depth, Domain};
use crate::fetcher::AttestationFetcher;
use crate::types::{AttestationRecord, CacheEntry, Capability};

/// Counters for one resolver's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    pub fetches: usize,
    pub cache_hits: usize,
    pub allow_list_skips: usize,
    pub cache_errors: usize,
}

#[derive(Debug, Default)]
struct Counters {
    fetches: AtomicUsize,
    cache_hits: AtomicUsize,
    allow_list_skips: AtomicUsize,
    cache_errors: AtomicUsize,
}

/// Turns host names into attestation records using a cache and a fetcher.
pub struct AttestationResolver {
    fetcher: Arc<dyn AttestationFetcher>,
    cache: Arc<dyn AttestationCache>,
    allow_list: AllowList,
    capability: Capability,
    counters: Counters,
}

impl AttestationResolver {
    pub fn new(fetcher: Arc<dyn AttestationFetcher>, cache: Arc<dyn AttestationCache>) -> Self {
        Self {
            fetcher,
            cache,
            allow_list: AllowList::default(),
            capability: Capability::topics(),
            counters: Counters::default(),
        }
    }

    /// Skip fetching domains that are not on `allow_list` (when non-empty).
    pub fn with_allow_list(mut self, allow_list: AllowList) -> Self {
        self.allow_list = allow_list;
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capability = capability;
        self
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            fetches: self.counters.fetches.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            allow_list_skips: self.counters.allow_list_skips.load(Ordering::Relaxed),
            cache_errors: self.counters.cache_errors.load(Ordering::Relaxed),
        }
    }

    /// Resolve the host of `url`.
    pub async fn resolve_url(&self, url: &str) -> Option<AttestationRecord> {
        let host = full_domain(url);
        if host.is_empty() {
            return None;
        }
        self.resolve(&host).await
    }

    /// Find the attestation covering `host`, if any.
    pub async fn resolve(&self, host: &Domain) -> Option<AttestationRecord> {
        for level in 2..=host.depth() {
            let candidate = suffix_at_depth(host, level);

            match self.cache_get(&candidate).await {
                CacheEntry::Positive(record) => {
                    self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                    return Some(record);
                }
                CacheEntry::Negative => {
                    self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                CacheEntry::Unknown => {}
            }

            if self.allow_list.excludes(&candidate) {
                self.counters.allow_list_skips.fetch_add(1, Ordering::Relaxed);
                self.cache_put(&candidate, None).await;
                continue;
            }

            match self.attest(&candidate).await {
                Some(record) => {
                    self.cache_put(&candidate, Some(&record)).await;
                    return Some(record);
                }
                None => self.cache_put(&candidate, None).await,
            }
        }
        None
    }

    /// Fetch and validate exactly `domain`, bypassing cache and allow-list.
    ///
    /// Every fetch failure is a negative outcome.
    pub async fn attest(&self, domain: &Domain) -> Option<AttestationRecord> {
        self.counters.fetches.fetch_add(1, Ordering::Relaxed);
        match self.fetcher.fetch(domain).await {
            Ok(document) => {
                let record = validate_record(&document, domain, &self.capability, Utc::now().timestamp());
                if record.is_none() {
                    tracing::debug!("{domain}: no valid attestation in document");
                }
                record
            }
            Err(e) => {
                tracing::debug!("{domain}: {e}");
                None
            }
        }
    }

    async fn cache_get(&self, domain: &Domain) -> CacheEntry {
        match self.cache.get(domain).await {
            Ok(entry) => entry,
            Err(e) => {
                self.counters.cache_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("cache lookup for {domain} failed: {e}");
                CacheEntry::Unknown
            }
        }
    }

    async fn cache_put(&self, domain: &Domain, record: Option<&AttestationRecord>) {
        if let Err(e) = self.cache.put(domain, record).await {
            self.counters.cache_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("cache write for {domain} failed: {e}");
        }
    }
}
