//! Response cache keyed by normalized location and unit system.
//!
//! Expiry is checked on read against the cache's configured TTL; nothing
//! sweeps the cache in the background.
//! Expired entries stay in place until they are replaced or evicted, so they
//! remain available for stale serving when that is switched on.

use chrono::{DateTime, Utc};
use moka::{future::Cache, notification::RemovalCause, policy::EvictionPolicy};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::model::{Location, UnitSystem, WeatherReport};

const CACHE_FILE_VERSION: u32 = 1;

/// Source of "now" for TTL checks.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// `<units>:<normalized location>`. The unit token never contains `:`, so
/// keys for different unit systems cannot collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub ttl: Duration,
    /// Maximum number of entries; the least recently used one goes first.
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { ttl: Duration::from_secs(600), capacity: 256 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub report: WeatherReport,
    pub inserted_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        // A timestamp in the future means the clock moved; don't trust it.
        match (now - self.inserted_at).to_std() {
            Ok(age) => age < ttl,
            Err(_) => false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: Vec<CacheEntry>,
}

/// Report cache with optional JSON file backing.
///
/// Capacity is enforced by moka with least-recently-used eviction. Expiry
/// stays ours: moka is built without a time-to-live so that expired entries
/// can still be served as stale.
pub struct ResponseCache {
    settings: CacheSettings,
    clock: Arc<dyn Clock>,
    path: Option<PathBuf>,
    store: Cache<CacheKey, CacheEntry>,
    // Serializes snapshot-and-write so file writes never interleave.
    persist: Mutex<()>,
}

impl fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache")
            .field("settings", &self.settings)
            .field("path", &self.path)
            .field("entry_count", &self.store.entry_count())
            .finish()
    }
}

fn build_store(capacity: usize) -> Cache<CacheKey, CacheEntry> {
    Cache::builder()
        .max_capacity(capacity as u64)
        .eviction_policy(EvictionPolicy::lru())
        .eviction_listener(|key: Arc<CacheKey>, _entry, cause: RemovalCause| {
            if cause.was_evicted() {
                debug!(key = %key, "Evicting least recently used cache entry");
            }
        })
        .build()
}

impl ResponseCache {
    pub fn in_memory(settings: CacheSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            path: None,
            store: build_store(settings.capacity),
            persist: Mutex::new(()),
        }
    }

    /// Open a file-backed cache. A missing file starts empty; an unreadable
    /// or corrupt one is logged and also starts empty.
    ///
    /// Loaded entries are replayed oldest first, so recency after a reload
    /// follows insertion time.
    pub async fn open(
        path: impl Into<PathBuf>,
        settings: CacheSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let path = path.into();
        let store = build_store(settings.capacity);

        match load_file(&path).await {
            Ok(Some(mut loaded)) => {
                debug!(path = %path.display(), count = loaded.len(), "Loaded cache file");
                loaded.sort_by_key(|entry| entry.inserted_at);
                for entry in loaded {
                    store.insert(entry.key.clone(), entry).await;
                }
                store.run_pending_tasks().await;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Ignoring unreadable cache file");
            }
        }

        Self {
            settings,
            clock,
            path: Some(path),
            store,
            persist: Mutex::new(()),
        }
    }

    pub fn key_for(location: &Location, units: UnitSystem) -> CacheKey {
        CacheKey(format!("{}:{}", units.as_str(), location.normalized()))
    }

    pub fn settings(&self) -> CacheSettings {
        self.settings
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The cached report, or `None` if absent or older than the TTL.
    pub async fn get(&self, key: &CacheKey) -> Option<WeatherReport> {
        let now = self.clock.now();
        self.store
            .get(key)
            .await
            .filter(|entry| entry.is_fresh(now, self.settings.ttl))
            .map(|entry| entry.report)
    }

    /// The stored entry regardless of age.
    pub async fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.store.get(key).await
    }

    /// The cached report regardless of age. Only for stale serving.
    pub async fn get_stale(&self, key: &CacheKey) -> Option<WeatherReport> {
        self.entry(key).await.map(|entry| entry.report)
    }

    /// Replace whatever is stored under `key`, stamped with the current time.
    pub async fn put(&self, key: CacheKey, report: WeatherReport) {
        let entry = CacheEntry {
            key: key.clone(),
            report,
            inserted_at: self.clock.now(),
        };

        self.store.insert(key, entry).await;
        self.store.run_pending_tasks().await;

        if let Some(path) = &self.path {
            let _guard = self.persist.lock().await;
            if let Err(err) = store_file(path, self.snapshot()).await {
                warn!(path = %path.display(), error = %err, "Failed to persist response cache");
            }
        }
    }

    /// Every entry, fresh or not, most recently inserted first.
    pub async fn entries(&self) -> Vec<CacheEntry> {
        let mut entries = self.snapshot();
        entries.reverse();
        entries
    }

    /// Whether `entry` would be served by [`ResponseCache::get`] right now.
    pub fn is_fresh(&self, entry: &CacheEntry) -> bool {
        entry.is_fresh(self.clock.now(), self.settings.ttl)
    }

    pub async fn len(&self) -> usize {
        self.store.run_pending_tasks().await;
        self.store.entry_count() as usize
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// All entries, oldest inserted first.
    fn snapshot(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self.store.iter().map(|(_, entry)| entry).collect();
        entries.sort_by_key(|entry| entry.inserted_at);
        entries
    }
}

async fn load_file(path: &Path) -> anyhow::Result<Option<Vec<CacheEntry>>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let file: CacheFile = serde_json::from_str(&contents)?;
    if file.version != CACHE_FILE_VERSION {
        anyhow::bail!("unsupported cache file version {}", file.version);
    }
    Ok(Some(file.entries))
}

/// Write to a sibling temp file, then rename over the target.
async fn store_file(path: &Path, entries: Vec<CacheEntry>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let body = serde_json::to_string(&CacheFile { version: CACHE_FILE_VERSION, entries })?;
    let temp_path = path.with_extension("tmp");
    tokio::fs::write(&temp_path, body).await?;
    tokio::fs::rename(&temp_path, path).await?;
    Ok(())
}
