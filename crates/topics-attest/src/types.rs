//! Core data types for attestation resolution and Topics API usage evidence.

use serde::{Deserialize, Serialize};

/// One validated attestation entry, as recorded in reports and caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationEntry {
    /// `issued_seconds_since_epoch` of the source entry.
    pub issued: i64,
    /// `expiry_seconds_since_epoch` of the source entry, if any.
    pub expired: Option<i64>,
}

/// The validated attestation found for a domain.
///
/// `domain` is the suffix at which the document was published, which may be
/// less specific than the host that was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRecord {
    pub domain: String,
    #[serde(rename = "sandbox_attestations")]
    pub attestations: Vec<AttestationEntry>,
}

/// Tri-state cache value for a single domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntry {
    /// Never queried.
    Unknown,
    /// Queried, no valid attestation.
    Negative,
    /// Queried, attested.
    Positive(AttestationRecord),
}

impl CacheEntry {
    pub fn is_unknown(&self) -> bool {
        matches!(self, CacheEntry::Unknown)
    }
}

/// The capability an attestation must declare for a platform.
///
/// Maps onto `platform_attestations[].attestations.<api>.<flag>` in the
/// well-known document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub platform: String,
    pub api: String,
    pub flag: String,
}

impl Capability {
    /// Topics API, "not used for identifying users across sites", on Chrome.
    pub fn topics() -> Self {
        Self {
            platform: "chrome".to_string(),
            api: "topics_api".to_string(),
            flag: "ServiceNotUsedForIdentifyingUserAcrossSites".to_string(),
        }
    }
}

impl Default for Capability {
    fn default() -> Self {
        Self::topics()
    }
}

/// How the browser says the Topics API was invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallerKind {
    Fetch,
    Iframe,
    Javascript,
    /// Anything the crawler reported that this crate does not know about.
    #[serde(untagged)]
    Other(String),
}

impl CallerKind {
    /// Callers that carry the topics header on the network request.
    pub fn uses_headers(&self) -> bool {
        matches!(self, CallerKind::Fetch | CallerKind::Iframe)
    }
}

/// One raw Topics API usage event, as recorded by the crawler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub context_origin_url: String,
    pub caller_source: CallerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_time: Option<serde_json::Value>,
}

/// Why a URL is believed to have invoked the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvidenceReason {
    HeaderRequest,
    HeaderResponse,
    ScriptContent,
}

/// A single piece of evidence attached to a usage event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceEntry {
    pub url: String,
    pub reason: EvidenceReason,
}

/// A usage event together with the evidence gathered for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedUsage {
    #[serde(flatten)]
    pub event: UsageEvent,
    pub possible_callers: Vec<EvidenceEntry>,
}

/// Correlation output for one crawl stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub attestations: Vec<AttestationRecord>,
    pub topics_api_usages: Vec<AnnotatedUsage>,
}

/// Why fetching a document or script failed.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("protocol error for {url}: {reason}")]
    Protocol { url: String, reason: String },

    #[error("parse error for {url}: {reason}")]
    Parse { url: String, reason: String },
}

/// Errors raised by cache backends.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Remote cache error: {0}")]
    Remote(String),

    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Top-level errors of the library.
#[derive(thiserror::Error, Debug)]
pub enum AttestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Convenience result type.
pub type AttestResult<T> = Result<T, AttestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_kind_keeps_unknown_values() {
        let kind: CallerKind = serde_json::from_str("\"worker\"").unwrap();
        assert_eq!(kind, CallerKind::Other("worker".to_string()));
        assert!(!kind.uses_headers());

        let kind: CallerKind = serde_json::from_str("\"iframe\"").unwrap();
        assert!(kind.uses_headers());
    }

    #[test]
    fn evidence_reason_serializes_kebab_case() {
        let entry = EvidenceEntry {
            url: "https://ads.example/".to_string(),
            reason: EvidenceReason::HeaderRequest,
        };
        let v = serde_json::to_value(&entry).unwrap();
        assert_eq!(v["reason"], "header-request");
    }

    #[test]
    fn annotated_usage_flattens_event() {
        let usage = AnnotatedUsage {
            event: UsageEvent {
                context_origin_url: "https://ads.example/".to_string(),
                caller_source: CallerKind::Fetch,
                usage_time: None,
            },
            possible_callers: vec![],
        };
        let v = serde_json::to_value(&usage).unwrap();
        assert_eq!(v["context_origin_url"], "https://ads.example/");
        assert_eq!(v["caller_source"], "fetch");
        assert!(v["possible_callers"].as_array().unwrap().is_empty());
    }
}
