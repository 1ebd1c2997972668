use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::pipeline::SummaryResult;

/// Entries older than this are not served, even if not yet expired.
const FRESHNESS_HOURS: i64 = 24;
/// Hard expiry; rows past it are treated as absent and removed by `purge_expired`.
const EXPIRY_DAYS: i64 = 7;

fn freshness_window() -> Duration {
    Duration::hours(FRESHNESS_HOURS)
}

fn hard_expiry() -> Duration {
    Duration::days(EXPIRY_DAYS)
}

/// Deterministic fingerprint of a URL: SHA-256 hex of its normalized form.
pub fn cache_key(url: &str) -> String {
    let trimmed = url.trim();
    let normalized = match url::Url::parse(trimmed) {
        Ok(parsed) => parsed.to_string(),
        Err(_) => trimmed.to_string(),
    };
    format!("{:x}", Sha256::digest(normalized.as_bytes()))
}

/// One stored row, decoded.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub result: SummaryResult,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        now - self.cached_at < freshness_window() && now < self.expires_at
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total: usize,
    pub fresh: usize,
    /// Past the freshness window but not yet expired.
    pub stale: usize,
    pub expired: usize,
}

/// Best-effort summary cache on SQLite. Read and write failures are logged and
/// degrade to a miss / no-op; they never reach the caller.
pub struct Cache {
    conn: Mutex<Connection>,
}

impl Cache {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {:?}", dir))?;
        }
        let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn get(&self, key: &str) -> Option<SummaryResult> {
        self.get_at(key, Utc::now())
    }

    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<SummaryResult> {
        match self.load(key) {
            Ok(Some(entry)) if entry.is_usable(now) => Some(entry.result),
            Ok(Some(entry)) => {
                info!("Cache expired for key: {}", entry.key);
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Error retrieving from cache: {:#}", e);
                None
            }
        }
    }

    pub fn put(&self, key: &str, result: &SummaryResult) {
        self.put_at(key, result, Utc::now());
    }

    pub fn put_at(&self, key: &str, result: &SummaryResult, now: DateTime<Utc>) {
        if let Err(e) = self.store(key, result, now) {
            warn!("Error caching summary: {:#}", e);
        } else {
            debug!("Cached summary under key {}", key);
        }
    }

    /// Physically delete rows past their hard expiry.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM summary_cache WHERE expires_at <= ?1",
            rusqlite::params![now.timestamp()],
        )?;
        Ok(removed)
    }

    pub fn stats(&self, now: DateTime<Utc>) -> Result<CacheStats> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT cached_at, expires_at FROM summary_cache")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stats = CacheStats {
            total: rows.len(),
            ..Default::default()
        };
        for (cached_at, expires_at) in rows {
            if now.timestamp() >= expires_at {
                stats.expired += 1;
            } else if parse_time(&cached_at).is_ok_and(|t| now - t < freshness_window()) {
                stats.fresh += 1;
            } else {
                stats.stale += 1;
            }
        }
        Ok(stats)
    }

    fn load(&self, key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT summary_data, cached_at, expires_at FROM summary_cache WHERE cache_key = ?1",
                rusqlite::params![key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((data, cached_at, expires_at)) = row else {
            return Ok(None);
        };
        let result: SummaryResult =
            serde_json::from_str(&data).context("Malformed summary_data")?;
        let expires_at = DateTime::from_timestamp(expires_at, 0)
            .ok_or_else(|| anyhow!("Malformed expires_at: {}", expires_at))?;

        Ok(Some(CacheEntry {
            key: key.to_string(),
            result,
            cached_at: parse_time(&cached_at)?,
            expires_at,
        }))
    }

    fn store(&self, key: &str, result: &SummaryResult, now: DateTime<Utc>) -> Result<()> {
        let data = serde_json::to_string(result)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO summary_cache (cache_key, summary_data, cached_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(cache_key) DO UPDATE SET
                summary_data = excluded.summary_data,
                cached_at    = excluded.cached_at,
                expires_at   = excluded.expires_at",
            rusqlite::params![key, data, now.to_rfc3339(), (now + hard_expiry()).timestamp()],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("cache connection poisoned"))
    }

    #[cfg(test)]
    fn raw(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS summary_cache (
            cache_key    TEXT PRIMARY KEY,
            summary_data TEXT NOT NULL,
            cached_at    TEXT NOT NULL,
            expires_at   INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_summary_cache_expires ON summary_cache(expires_at);
        ",
    )?;
    Ok(())
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Malformed cached_at: {}", s))?
        .with_timezone(&Utc))
}

// ── Tests ──
