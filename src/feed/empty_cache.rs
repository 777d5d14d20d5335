//! Persisted set of (date, league) pairs that returned no matches.
//!
//! Most leagues have nothing scheduled on most days, so remembering confirmed
//! empty results lets the fetcher skip those requests until the entry expires.
//! The cache is one JSON file written only by an explicit [`EmptyResultCache::save`].

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

pub const CACHE_FILE_VERSION: u32 = 1;
pub const DEFAULT_TTL_DAYS: i64 = 7;
pub const MAX_TTL_DAYS: i64 = 365;

/// Time source, swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[cfg(test)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    expires: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    /// key: "YYYY-MM-DD:leagueId"
    empty_results: HashMap<String, CacheEntry>,
}

impl Default for CacheFile {
    fn default() -> Self {
        CacheFile {
            version: CACHE_FILE_VERSION,
            empty_results: HashMap::new(),
        }
    }
}

pub struct EmptyResultCache {
    path: PathBuf,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    data: RwLock<CacheFile>,
    /// Serialises writers of the backing file.
    save_lock: Mutex<()>,
}

impl EmptyResultCache {
    /// Empty in-memory cache bound to `path`; nothing is read from disk.
    /// `ttl` is capped at [`MAX_TTL_DAYS`].
    pub fn new(path: impl Into<PathBuf>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        EmptyResultCache {
            path: path.into(),
            ttl: ttl.min(Duration::days(MAX_TTL_DAYS)),
            clock,
            data: RwLock::new(CacheFile::default()),
            save_lock: Mutex::new(()),
        }
    }

    /// Load the cache file if it is readable, start empty otherwise, then
    /// sweep expired entries. Never fails.
    pub fn open(path: impl Into<PathBuf>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let cache = Self::new(path, ttl, clock);
        match cache.load() {
            Ok(n) => info!("Empty-result cache loaded: {} entries from {}", n, cache.path.display()),
            Err(e) => debug!("Starting with an empty cache: {:#}", e),
        }
        let removed = cache.clean_expired();
        if removed > 0 {
            info!("Removed {} expired empty-result entries", removed);
        }
        cache
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheFile> {
        self.data.read().unwrap_or_else(|poisoned| {
            warn!("Empty-result cache lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheFile> {
        self.data.write().unwrap_or_else(|poisoned| {
            warn!("Empty-result cache lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn key(date: &str, source_id: i64) -> String {
        format!("{}:{}", date, source_id)
    }

    /// True iff the pair was marked empty and the mark has not expired yet.
    /// Expired entries are left in place for the next sweep.
    pub fn is_empty(&self, date: &str, source_id: i64) -> bool {
        let now = self.clock.now();
        self.read()
            .empty_results
            .get(&Self::key(date, source_id))
            .is_some_and(|entry| entry.expires > now)
    }

    /// Record that the pair returned nothing, expiring one TTL from now.
    pub fn mark_empty(&self, date: &str, source_id: i64) {
        let expires = self
            .clock
            .now()
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.write()
            .empty_results
            .insert(Self::key(date, source_id), CacheEntry { expires });
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn clean_expired(&self) -> usize {
        let now = self.clock.now();
        let mut data = self.write();
        let before = data.empty_results.len();
        data.empty_results.retain(|_, entry| entry.expires > now);
        before - data.empty_results.len()
    }

    /// Total entries and how many of them are already expired.
    pub fn stats(&self) -> (usize, usize) {
        let now = self.clock.now();
        let data = self.read();
        let expired = data
            .empty_results
            .values()
            .filter(|entry| entry.expires <= now)
            .count();
        (data.empty_results.len(), expired)
    }

    /// Write the whole cache to its file, creating the parent directory.
    pub fn save(&self) -> Result<()> {
        let _guard = self.save_lock.lock().unwrap_or_else(|p| p.into_inner());
        let json = {
            let data = self.read();
            serde_json::to_string_pretty(&*data).context("Failed to serialise empty-result cache")?
        };
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
        }
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        debug!("Empty-result cache saved to {}", self.path.display());
        Ok(())
    }

    /// Replace the in-memory contents with the file's. On error the current
    /// contents are kept.
    pub fn load(&self) -> Result<usize> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let file: CacheFile = serde_json::from_str(&raw)
            .with_context(|| format!("Corrupt cache file {}", self.path.display()))?;
        let n = file.empty_results.len();
        *self.write() = file;
        Ok(n)
    }
}
