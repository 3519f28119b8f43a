//! Allow-list of domains known in advance to publish attestations.
//!
//! Chrome ships the enrolled sites as a preloaded protobuf blob
//! (`privacy-sandbox-attestations.dat`). Instead of decoding the protobuf we
//! split it on bytes that cannot appear in a URL and keep the tokens that
//! parse as URLs, which recovers every enrolled site.

use std::collections::HashSet;
use std::path::Path;

use regex::bytes::Regex;
use url::Url;

use crate::domain::{full_domain, Domain};
use crate::types::{AttestError, AttestResult};

/// Set of attestable domains. Empty means "no filtering".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    domains: HashSet<Domain>,
}

impl AllowList {
    pub fn new<I: IntoIterator<Item = Domain>>(domains: I) -> Self {
        Self {
            domains: domains.into_iter().filter(|d| !d.is_empty()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn contains(&self, domain: &Domain) -> bool {
        self.domains.contains(domain)
    }

    /// True when this list is active and `domain` is not on it.
    pub fn excludes(&self, domain: &Domain) -> bool {
        !self.is_empty() && !self.contains(domain)
    }

    /// Extract enrolled sites from Chrome's preloaded attestation blob.
    pub fn from_preloaded_bytes(bytes: &[u8]) -> Self {
        let separators = Regex::new(r"(?-u)[\x00-\x2c\x7B-\x7F]+").expect("static regex");
        let domains = separators
            .split(bytes)
            .filter_map(|token| std::str::from_utf8(token).ok())
            .filter(|token| is_url(token))
            .map(full_domain);
        Self::new(domains)
    }

    /// One domain or URL per line; blank lines and `#` comments are skipped.
    pub fn from_domain_lines(text: &str) -> Self {
        let domains = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(full_domain);
        Self::new(domains)
    }

    /// Load from a file. `.dat` files are treated as Chrome's preloaded
    /// blob, anything else as a plain list.
    pub fn load(path: &Path) -> AttestResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            AttestError::Configuration(format!(
                "cannot read allow-list {}: {e}",
                path.display()
            ))
        })?;

        let list = if path.extension().and_then(|e| e.to_str()) == Some("dat") {
            Self::from_preloaded_bytes(&bytes)
        } else {
            Self::from_domain_lines(&String::from_utf8_lossy(&bytes))
        };
        tracing::debug!("loaded {} allow-listed domains from {}", list.len(), path.display());
        Ok(list)
    }
}

fn is_url(token: &str) -> bool {
    Url::parse(token)
        .map(|u| !u.scheme().is_empty() && u.host_str().is_some_and(|h| !h.is_empty()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn preloaded_blob_yields_sites() {
        let mut blob = Vec::new();
        blob.extend_from_slice(b"\x0a\x1bhttps://ads.example.com\x12\x02\x08\x01");
        blob.extend_from_slice(b"\x0a\x14https://tracker.co.uk\x10\x01");
        blob.extend_from_slice(b"\x22garbage\x00not a url");

        let list = AllowList::from_preloaded_bytes(&blob);
        assert_eq!(list.len(), 2);
        assert!(list.contains(&"ads.example.com".into()));
        assert!(list.contains(&"tracker.co.uk".into()));
    }

    #[test]
    fn domain_lines() {
        let list = AllowList::from_domain_lines("# enrolled\nexample.com\n\nhttps://Ads.Example.org/\n");
        assert_eq!(list.len(), 2);
        assert!(list.contains(&"ads.example.org".into()));
    }

    #[test]
    fn empty_list_excludes_nothing() {
        let list = AllowList::default();
        assert!(!list.excludes(&"anything.com".into()));

        let list = AllowList::new(vec![Domain::new("example.com")]);
        assert!(list.excludes(&"other.com".into()));
        assert!(!list.excludes(&"example.com".into()));
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let err = AllowList::load(Path::new("/nonexistent/attestations.dat")).unwrap_err();
        assert!(matches!(err, AttestError::Configuration(_)));
    }

    #[test]
    fn load_plain_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "example.com").unwrap();
        let list = AllowList::load(file.path()).unwrap();
        assert!(list.contains(&"example.com".into()));
    }
}
