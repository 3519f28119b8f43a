//! topics-attest — Privacy Sandbox attestation resolution and Topics API
//! usage correlation for crawl records.

pub mod allowlist;
pub mod cache;
pub mod correlator;
pub mod crawl;
pub mod document;
pub mod domain;
pub mod fetcher;
pub mod resolver;
pub mod types;

pub use allowlist::AllowList;
pub use cache::{AttestationCache, MemoryCache, NoCache, RemoteCache, SqliteCache};
pub use correlator::{ScriptCheck, UsageCorrelator};
pub use crawl::{CrawlOutput, CrawlStage};
pub use document::{validate, AttestationDocument};
pub use domain::{full_domain, origin, registrable_domain, suffix_at_depth, Domain};
pub use fetcher::{AttestationFetcher, HttpFetcher, ScriptFetcher};
pub use resolver::{AttestationResolver, ResolverStats};
pub use types::*;
