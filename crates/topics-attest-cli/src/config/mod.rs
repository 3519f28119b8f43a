//! Configuration loading and resolution.
//!
//! Every setting resolves as: explicit flag > environment variable > default.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use topics_attest::{
    AllowList, AttestationCache, AttestationResolver, HttpFetcher, MemoryCache, NoCache,
    RemoteCache, ScriptCheck, SqliteCache, UsageCorrelator,
};

use crate::oplog::OperationLog;

pub const CACHE_URL_ENV: &str = "TOPICS_ATTEST_CACHE_URL";
pub const CACHE_DB_ENV: &str = "TOPICS_ATTEST_CACHE_DB";
pub const ALLOW_LIST_ENV: &str = "TOPICS_ATTEST_ALLOW_LIST";

pub const DEFAULT_OUTFILE: &str = "topics_output.json";
pub const DEFAULT_SERVICE_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_SERVICE_DB: &str = "cache.db";

/// Where resolved attestation outcomes are remembered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheTier {
    /// Nothing is remembered across lookups.
    Disabled,
    /// Process-local map.
    Memory,
    /// Local SQLite file.
    Sqlite(PathBuf),
    /// Shared cache service.
    Remote(String),
}

impl CacheTier {
    /// Pick the tier from flags and environment. A URL wins over a file.
    pub fn resolve(no_cache: bool, url: Option<&str>, db: Option<&str>) -> Self {
        if no_cache {
            return CacheTier::Disabled;
        }
        if let Some(url) = url.map(str::to_string).or_else(|| env_nonempty(CACHE_URL_ENV)) {
            return CacheTier::Remote(url);
        }
        if let Some(db) = db.map(str::to_string).or_else(|| env_nonempty(CACHE_DB_ENV)) {
            return CacheTier::Sqlite(PathBuf::from(db));
        }
        CacheTier::Memory
    }

    pub fn describe(&self) -> String {
        match self {
            CacheTier::Disabled => "disabled".to_string(),
            CacheTier::Memory => "in-memory".to_string(),
            CacheTier::Sqlite(path) => format!("sqlite at {}", path.display()),
            CacheTier::Remote(url) => format!("remote service at {url}"),
        }
    }

    /// Build the backend. A tier that cannot be reached is reported once and
    /// replaced by an in-memory cache for this run.
    pub async fn open(&self, timeout: Duration, log: &mut OperationLog) -> Arc<dyn AttestationCache> {
        match self {
            CacheTier::Disabled => Arc::new(NoCache),
            CacheTier::Memory => Arc::new(MemoryCache::new()),
            CacheTier::Sqlite(path) => match SqliteCache::open(path) {
                Ok(cache) => Arc::new(cache),
                Err(e) => {
                    log.log(format!(
                        "Could not open cache {}: {e}; shared cache will not be used",
                        path.display()
                    ));
                    Arc::new(MemoryCache::new())
                }
            },
            CacheTier::Remote(url) => {
                let cache = RemoteCache::new(url, timeout);
                match cache.ping().await {
                    Ok(()) => Arc::new(cache),
                    Err(e) => {
                        log.log(format!(
                            "Could not reach cache service {url}: {e}; shared cache will not be used"
                        ));
                        Arc::new(MemoryCache::new())
                    }
                }
            }
        }
    }
}

/// Resolve the allow-list path, if any.
pub fn resolve_allow_list_path(explicit: Option<&str>) -> Option<PathBuf> {
    explicit
        .map(str::to_string)
        .or_else(|| env_nonempty(ALLOW_LIST_ENV))
        .map(PathBuf::from)
}

/// Load the allow-list. A missing or unreadable file disables filtering.
pub fn load_allow_list(path: Option<&Path>, log: &mut OperationLog) -> Option<AllowList> {
    let path = path?;
    match AllowList::load(path) {
        Ok(list) => {
            log.log(format!(
                "Loaded {} allow-listed domains from {}",
                list.len(),
                path.display()
            ));
            Some(list)
        }
        Err(e) => {
            log.log(format!("Allow-list unavailable, not filtering: {e}"));
            None
        }
    }
}

/// Everything needed to build a correlator for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub timeout: Duration,
    pub cache: CacheTier,
    pub allow_list: Option<PathBuf>,
    pub script_check: ScriptCheck,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout: topics_attest::fetcher::DEFAULT_TIMEOUT,
            cache: CacheTier::Memory,
            allow_list: None,
            script_check: ScriptCheck::default(),
        }
    }
}

impl Settings {
    /// Wire fetcher, cache, allow-list and resolver into a correlator.
    pub async fn build_correlator(&self, log: &mut OperationLog) -> UsageCorrelator {
        let fetcher = Arc::new(HttpFetcher::new(self.timeout));
        log.log(format!("Attestation cache: {}", self.cache.describe()));
        let cache = self.cache.open(self.timeout, log).await;

        let mut resolver = AttestationResolver::new(fetcher.clone(), cache);
        if let Some(list) = load_allow_list(self.allow_list.as_deref(), log) {
            resolver = resolver.with_allow_list(list);
        }

        UsageCorrelator::new(Arc::new(resolver), fetcher).with_script_check(self.script_check)
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_flags_win() {
        assert_eq!(CacheTier::resolve(true, Some("http://x"), None), CacheTier::Disabled);
        assert_eq!(
            CacheTier::resolve(false, Some("http://cache:8080"), Some("c.db")),
            CacheTier::Remote("http://cache:8080".to_string())
        );
        assert_eq!(
            resolve_allow_list_path(Some("list.txt")),
            Some(PathBuf::from("list.txt"))
        );
    }

    #[tokio::test]
    async fn missing_allow_list_disables_filtering() {
        let mut log = OperationLog::new();
        let list = load_allow_list(Some(Path::new("/nonexistent/allow.txt")), &mut log);
        assert!(list.is_none());
        assert_eq!(log.entries().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_service_falls_back() {
        let mut log = OperationLog::new();
        let tier = CacheTier::Remote("http://127.0.0.1:1".to_string());
        let _cache = tier.open(Duration::from_millis(300), &mut log).await;
        assert!(log.entries()[0].message().contains("will not be used"));
    }

    #[tokio::test]
    async fn sqlite_tier_opens_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("attest.db");
        let mut log = OperationLog::new();
        let _cache = CacheTier::Sqlite(path.clone())
            .open(Duration::from_secs(1), &mut log)
            .await;
        assert!(path.exists());
        assert!(log.entries().is_empty());
    }
}
