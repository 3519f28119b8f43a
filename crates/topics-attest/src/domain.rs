//! Domain normalization — URL → origin, full domain, registrable domain.
//!
//! Registrable domains use a small static exception table of multi-label
//! public suffixes instead of the full Public Suffix List: attestation
//! lookups walk every suffix level anyway, so the table only needs to cover
//! the suffixes that show up in crawls.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// Two-label public suffixes under which the registrable domain has three labels.
pub const MULTI_LABEL_SUFFIXES: &[&str] = &[
    "co.uk", "co.jp", "co.hu", "co.il", "com.au", "co.ve", "co.in", "com.ec", "com.pk", "co.th",
    "co.nz", "com.br", "com.sg", "com.sa", "com.do", "co.za", "com.hk", "com.mx", "com.ly",
    "com.ua", "com.eg", "com.pe", "com.tr", "co.kr", "com.ng", "com.ph", "com.my", "com.tw",
    "com.kw", "co.id", "com.com", "com.vn", "com.bd", "com.ar", "com.co", "org.uk", "net.gr",
    "web.app",
];

/// A lowercase, dot-separated host name without leading or trailing dots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Domain(String);

impl Domain {
    /// Normalize a raw host string.
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().trim_matches('.').to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Empty means "no domain".
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn labels(&self) -> Vec<&str> {
        if self.0.is_empty() {
            Vec::new()
        } else {
            self.0.split('.').collect()
        }
    }

    /// Number of labels.
    pub fn depth(&self) -> usize {
        self.labels().len()
    }

    /// The last `n` labels. Returns the whole domain when `n` exceeds the depth.
    pub fn suffix(&self, n: usize) -> Domain {
        let labels = self.labels();
        let start = labels.len().saturating_sub(n);
        Domain(labels[start..].join("."))
    }

    /// True when `pattern`'s labels equal the tail of this domain's labels.
    pub fn matches_suffix(&self, pattern: &Domain) -> bool {
        let ours = self.labels();
        let theirs = pattern.labels();
        !theirs.is_empty() && theirs.len() <= ours.len() && ours[ours.len() - theirs.len()..] == theirs[..]
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Domain {
    fn from(raw: &str) -> Self {
        Domain::new(raw)
    }
}

/// Full domain of a URL.
///
/// Strings without a scheme are treated as bare hosts; anything after the
/// first `/` and any `:port` are dropped. Returns an empty domain when no
/// host can be found.
pub fn full_domain(url: &str) -> Domain {
    if url.contains("://") {
        return match Url::parse(url) {
            Ok(parsed) => Domain::new(parsed.host_str().unwrap_or_default()),
            Err(_) => Domain::default(),
        };
    }

    let host = url.split('/').next().unwrap_or_default();
    let host = host.rsplit('@').next().unwrap_or_default();
    let host = match host.rsplit_once(':') {
        Some((h, port)) if port.chars().all(|c| c.is_ascii_digit()) => h,
        _ => host,
    };
    Domain::new(host)
}

/// `"{scheme}://{host}/"`, with the port when the URL names a non-default one.
///
/// This is the key usage events are recorded under. Unparseable URLs yield
/// an empty string.
pub fn origin(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return String::new();
    };
    let Some(host) = parsed.host_str() else {
        return String::new();
    };
    match parsed.port() {
        Some(port) => format!("{}://{}:{}/", parsed.scheme(), host, port),
        None => format!("{}://{}/", parsed.scheme(), host),
    }
}

/// Registrable domain (eTLD+1) using [`MULTI_LABEL_SUFFIXES`].
pub fn registrable_domain(domain: &Domain) -> Domain {
    let last_two = domain.suffix(2);
    if MULTI_LABEL_SUFFIXES.contains(&last_two.as_str()) {
        domain.suffix(3)
    } else {
        last_two
    }
}

/// The last `n` labels of `domain`.
pub fn suffix_at_depth(domain: &Domain, n: usize) -> Domain {
    domain.suffix(n)
}
