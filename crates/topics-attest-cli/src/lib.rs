//! topics-attest CLI — crawl analysis and the shared attestation cache service.

pub mod analyze;
pub mod config;
pub mod oplog;
pub mod service;

pub use analyze::{analyze, extract_domains, AnalysisOutput};
pub use config::{CacheTier, Settings};
pub use oplog::OperationLog;
pub use service::CacheService;
