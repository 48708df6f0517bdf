//! Caching layer: cache-key generation (§4.3), the result cache (§4.4),
//! and the per-execution filter-SQL cache (§4.5).

pub mod filter_cache;
pub mod key;
pub mod result_cache;

pub use filter_cache::{FilterCacheStats, FilterSqlCache};
pub use key::{cache_key, canonical_json_string, canonical_query_string, fnv1a_hex};
pub use result_cache::{CacheEntryMetadata, CachedValue, MemoryResultCache, ResultCache};

/// Errors surfaced by the result cache. Non-cryptographic hashing and
/// pure in-memory state mean the only real failure mode is (de)serializing
/// a cached value.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;
