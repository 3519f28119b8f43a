//! The well-known Privacy Sandbox attestation document and its validation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{full_domain, Domain};
use crate::types::{AttestationEntry, AttestationRecord, Capability};

/// Path of the attestation document under a domain's origin.
pub const WELL_KNOWN_PATH: &str = "/.well-known/privacy-sandbox-attestations.json";

/// Parsed attestation document. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttestationDocument {
    #[serde(default, rename = "privacy_sandbox_api_attestations")]
    pub entries: Vec<DocumentEntry>,
}

/// One entry of `privacy_sandbox_api_attestations`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentEntry {
    #[serde(default)]
    pub issued_seconds_since_epoch: Option<i64>,
    #[serde(default)]
    pub expiry_seconds_since_epoch: Option<i64>,
    #[serde(default)]
    pub enrollment_site: Option<String>,
    #[serde(default)]
    pub platform_attestations: Vec<PlatformAttestation>,
}

/// Per-platform map of `api → flag → value`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformAttestation {
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub attestations: HashMap<String, HashMap<String, Value>>,
}

impl AttestationDocument {
    /// Interpret an arbitrary JSON value as a document.
    ///
    /// Anything that does not have the expected shape becomes an empty
    /// document, which never validates.
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value(value) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::debug!("malformed attestation document: {e}");
                Self::default()
            }
        }
    }

    /// True when at least one entry has not expired at `now`.
    pub fn has_unexpired_entry(&self, now: i64) -> bool {
        self.entries.iter().any(|e| e.is_unexpired(now))
    }
}

impl DocumentEntry {
    pub fn is_unexpired(&self, now: i64) -> bool {
        self.expiry_seconds_since_epoch.map_or(true, |expiry| expiry > now)
    }

    /// The enrollment site, if declared, must equal `target`'s suffix at the
    /// site's own label depth.
    pub fn enrollment_matches(&self, target: &Domain) -> bool {
        let Some(site) = &self.enrollment_site else {
            return true;
        };
        let site = full_domain(site);
        !site.is_empty() && target.suffix(site.depth()) == site
    }

    /// The capability flag must be explicitly `true` for the platform.
    pub fn declares(&self, capability: &Capability) -> bool {
        self.platform_attestations
            .iter()
            .filter(|p| p.platform == capability.platform)
            .filter_map(|p| p.attestations.get(&capability.api))
            .any(|flags| flags.get(&capability.flag) == Some(&Value::Bool(true)))
    }
}

/// Entries of `document` that are valid for `target` and `capability` at `now`.
///
/// Expiry is judged document-wide first: when every entry has expired the
/// document yields nothing, whatever the individual entries declare.
pub fn validate(
    document: &AttestationDocument,
    target: &Domain,
    capability: &Capability,
    now: i64,
) -> Vec<AttestationEntry> {
    if !document.has_unexpired_entry(now) {
        return Vec::new();
    }

    document
        .entries
        .iter()
        .filter(|e| e.is_unexpired(now))
        .filter(|e| e.enrollment_matches(target))
        .filter(|e| e.declares(capability))
        .filter_map(|e| {
            e.issued_seconds_since_epoch.map(|issued| AttestationEntry {
                issued,
                expired: e.expiry_seconds_since_epoch,
            })
        })
        .collect()
}

/// Validate and wrap the result as a record for `target`, if anything is valid.
pub fn validate_record(
    document: &AttestationDocument,
    target: &Domain,
    capability: &Capability,
    now: i64,
) -> Option<AttestationRecord> {
    let attestations = validate(document, target, capability, now);
    if attestations.is_empty() {
        None
    } else {
        Some(AttestationRecord {
            domain: target.to_string(),
            attestations,
        })
    }
}
