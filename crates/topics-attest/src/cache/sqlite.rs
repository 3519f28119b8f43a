//! Durable cache tier backed by a single SQLite table.
//!
//! Writes are `INSERT ... ON CONFLICT DO NOTHING`, so the table itself
//! enforces write-once even when several writers share the file.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::{AttestationCache, CachedAttestation};
use crate::domain::Domain;
use crate::types::{AttestationRecord, CacheEntry, CacheError};

/// SQLite-backed attestation cache.
pub struct SqliteCache {
    db: Mutex<Connection>,
}

impl SqliteCache {
    /// Open or create a cache database file.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    /// A throwaway database, mostly for tests.
    pub fn in_memory() -> Result<Self, CacheError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> Result<Self, CacheError> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache (
                domain TEXT PRIMARY KEY,
                attested INTEGER NOT NULL,
                attestation_result TEXT
            );",
        )?;
        Ok(Self { db: Mutex::new(db) })
    }

    /// Read the stored outcome for a domain, if any.
    pub fn get_raw(&self, domain: &str) -> Result<Option<CachedAttestation>, CacheError> {
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let row: Option<(bool, Option<String>)> = db
            .query_row(
                "SELECT attested, attestation_result FROM cache WHERE domain = ?1",
                params![domain],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((attested, result)) = row else {
            return Ok(None);
        };
        let attestation_result = match result.filter(|s| !s.is_empty()) {
            Some(text) => match serde_json::from_str::<Value>(&text)? {
                Value::Null => None,
                v => Some(v),
            },
            None => None,
        };
        Ok(Some(CachedAttestation {
            attested,
            attestation_result,
        }))
    }

    /// Insert an outcome unless the domain already has one.
    ///
    /// Returns whether a row was written.
    pub fn insert_raw(&self, domain: &str, value: &CachedAttestation) -> Result<bool, CacheError> {
        let result = value
            .attestation_result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let inserted = db.execute(
            "INSERT INTO cache (domain, attested, attestation_result)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(domain) DO NOTHING",
            params![domain, value.attested, result],
        )?;
        Ok(inserted > 0)
    }

    /// Number of cached domains.
    pub fn count(&self) -> Result<usize, CacheError> {
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let n: i64 = db.query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

#[async_trait]
impl AttestationCache for SqliteCache {
    async fn get(&self, domain: &Domain) -> Result<CacheEntry, CacheError> {
        match self.get_raw(domain.as_str())? {
            Some(stored) => stored.into_entry(domain),
            None => Ok(CacheEntry::Unknown),
        }
    }

    async fn put(&self, domain: &Domain, record: Option<&AttestationRecord>) -> Result<(), CacheError> {
        let stored = CachedAttestation::from_record(record)?;
        self.insert_raw(domain.as_str(), &stored)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttestationEntry;
    use tempfile::TempDir;

    fn record(domain: &str) -> AttestationRecord {
        AttestationRecord {
            domain: domain.to_string(),
            attestations: vec![AttestationEntry {
                issued: 1,
                expired: Some(2),
            }],
        }
    }

    #[tokio::test]
    async fn write_once_in_table() {
        let cache = SqliteCache::in_memory().unwrap();
        let d = Domain::new("example.com");

        assert_eq!(cache.get(&d).await.unwrap(), CacheEntry::Unknown);
        cache.put(&d, Some(&record("example.com"))).await.unwrap();
        cache.put(&d, None).await.unwrap();
        assert_eq!(cache.get(&d).await.unwrap(), CacheEntry::Positive(record("example.com")));
        assert_eq!(cache.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cache.db");

        {
            let cache = SqliteCache::open(&path).unwrap();
            cache.put(&"neg.com".into(), None).await.unwrap();
            cache.put(&"pos.com".into(), Some(&record("pos.com"))).await.unwrap();
        }

        let cache = SqliteCache::open(&path).unwrap();
        assert_eq!(cache.get(&"neg.com".into()).await.unwrap(), CacheEntry::Negative);
        assert_eq!(
            cache.get(&"pos.com".into()).await.unwrap(),
            CacheEntry::Positive(record("pos.com"))
        );
    }

    #[test]
    fn insert_raw_reports_conflicts() {
        let cache = SqliteCache::in_memory().unwrap();
        let neg = CachedAttestation {
            attested: false,
            attestation_result: None,
        };
        assert!(cache.insert_raw("a.com", &neg).unwrap());
        assert!(!cache.insert_raw("a.com", &neg).unwrap());
        assert_eq!(cache.get_raw("a.com").unwrap(), Some(neg));
        assert_eq!(cache.get_raw("b.com").unwrap(), None);
    }
}
