//! In-process result cache (§4.4): async trait + TTL/LRU in-memory impl.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;

use super::CacheResult;

/// Metadata returned alongside a cache hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntryMetadata {
    pub cached_at_ms: u64,
    pub ttl_ms: u64,
    pub ttl_remaining_ms: u64,
}

/// A cached value plus its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue<T> {
    pub value: T,
    pub metadata: CacheEntryMetadata,
}

/// Interface for a result cache keyed by [`super::key::cache_key`] output
/// (§4.4). Implementations need not be persistent; the in-memory variant
/// below is the reference implementation.
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> CacheResult<Option<CachedValue<T>>>;
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_ms: Option<u64>,
    ) -> CacheResult<()>;
    async fn delete(&self, key: &str) -> CacheResult<()>;
    /// Deletes every key matching a glob with at most one `*`, which may
    /// appear leading, trailing, or in the middle.
    async fn delete_pattern(&self, pattern: &str) -> CacheResult<usize>;
    async fn has(&self, key: &str) -> CacheResult<bool>;
    async fn close(&self) -> CacheResult<()>;
}

struct Entry {
    json: String,
    created_at_ms: u64,
    expires_at: Instant,
    ttl_ms: u64,
    last_accessed: Instant,
}

/// In-memory TTL + LRU result cache.
///
/// Entries carry an absolute expiry; `get` lazily evicts an expired entry
/// and returns `None` rather than serving stale data. When `max_entries`
/// is set, an insertion that would exceed it evicts least-recently-used
/// entries first. A background cleanup task periodically sweeps expired
/// entries; it is dropped (and stops) when the cache itself is dropped, so
/// it never holds the process open.
pub struct MemoryResultCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    default_ttl_ms: u64,
    max_entries: Option<usize>,
    cleanup_handle: Option<tokio::task::JoinHandle<()>>,
}

impl MemoryResultCache {
    pub fn new(default_ttl_ms: u64, max_entries: Option<usize>) -> Self {
        let entries: Arc<Mutex<HashMap<String, Entry>>> = Arc::new(Mutex::new(HashMap::new()));
        let cleanup_handle = Self::spawn_cleanup(Arc::clone(&entries));
        Self {
            entries,
            default_ttl_ms,
            max_entries,
            cleanup_handle: Some(cleanup_handle),
        }
    }

    fn spawn_cleanup(entries: Arc<Mutex<HashMap<String, Entry>>>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                let now = Instant::now();
                let mut guard = entries.lock().await;
                guard.retain(|_, entry| entry.expires_at > now);
            }
        })
    }

    async fn evict_lru_if_needed(&self, guard: &mut HashMap<String, Entry>) {
        let Some(max) = self.max_entries else { return };
        while guard.len() >= max {
            let Some(oldest_key) = guard
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            guard.remove(&oldest_key);
        }
    }

    fn now_ms() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

impl Drop for MemoryResultCache {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup_handle.take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl ResultCache for MemoryResultCache {
    async fn get<T: DeserializeOwned + Send>(
        &self,
        key: &str,
    ) -> CacheResult<Option<CachedValue<T>>> {
        let mut guard = self.entries.lock().await;
        let now = Instant::now();
        let Some(entry) = guard.get_mut(key) else {
            return Ok(None);
        };
        if entry.expires_at <= now {
            guard.remove(key);
            return Ok(None);
        }
        entry.last_accessed = now;
        let value: T = serde_json::from_str(&entry.json)?;
        let ttl_remaining_ms = entry.expires_at.saturating_duration_since(now).as_millis() as u64;
        Ok(Some(CachedValue {
            value,
            metadata: CacheEntryMetadata {
                cached_at_ms: entry.created_at_ms,
                ttl_ms: entry.ttl_ms,
                ttl_remaining_ms,
            },
        }))
    }

    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_ms: Option<u64>,
    ) -> CacheResult<()> {
        let ttl_ms = ttl_ms.unwrap_or(self.default_ttl_ms);
        let json = serde_json::to_string(value)?;
        let now = Instant::now();
        let mut guard = self.entries.lock().await;
        if !guard.contains_key(key) {
            self.evict_lru_if_needed(&mut guard).await;
        }
        guard.insert(
            key.to_string(),
            Entry {
                json,
                created_at_ms: Self::now_ms(),
                expires_at: now + Duration::from_millis(ttl_ms),
                ttl_ms,
                last_accessed: now,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<usize> {
        let mut guard = self.entries.lock().await;
        let before = guard.len();
        guard.retain(|key, _| !glob_match(pattern, key));
        Ok(before - guard.len())
    }

    async fn has(&self, key: &str) -> CacheResult<bool> {
        let guard = self.entries.lock().await;
        Ok(guard
            .get(key)
            .map(|e| e.expires_at > Instant::now())
            .unwrap_or(false))
    }

    async fn close(&self) -> CacheResult<()> {
        Ok(())
    }
}

/// Matches a glob with at most one `*` (leading, trailing, or in the
/// middle) against a literal key.
fn glob_match(pattern: &str, key: &str) -> bool {
    match pattern.find('*') {
        None => pattern == key,
        Some(idx) => {
            let (prefix, rest) = pattern.split_at(idx);
            let suffix = &rest[1..];
            key.len() >= prefix.len() + suffix.len()
                && key.starts_with(prefix)
                && key.ends_with(suffix)
        }
    }
}
