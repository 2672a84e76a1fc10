//! Byte-bounded LRU response cache.
//!
//! [`ResponseCache`] caches summary and mindmap results so identical
//! requests never reach the remote service twice. A cache hit bypasses
//! budget checks, permits, retries and cost accounting entirely.
//!
//! # Eviction
//!
//! Capacity is measured in bytes (see [`Payload::size_bytes()`]). `put`
//! evicts least-recently-used entries one at a time until the new entry
//! fits, then inserts it. A hit on `get` refreshes the entry's position.
//! An entry larger than the whole capacity is rejected rather than
//! flushing the cache for it.
//!
//! # Expiry
//!
//! No TTL by default: entries live until evicted or the process exits.
//! With [`CacheConfig::ttl()`] set, stale entries are dropped lazily when
//! a `get` finds them; eviction order is unaffected.
//!
//! # Concurrency
//!
//! All bookkeeping sits behind one short-lived mutex that is never held
//! across an await point. Two requests racing on the same key both miss,
//! both call the service, and the later `put` replaces the earlier entry
//! without double-counting its bytes.

use std::fmt;
use std::num::NonZeroU64;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lru::LruCache;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::debug;

use crate::telemetry;
use crate::types::{OperationKind, Payload};

/// Default capacity: 1 GiB.
const DEFAULT_CAPACITY_BYTES: u64 = 1024 * 1024 * 1024;

/// Configuration for the response cache.
///
/// ```rust
/// # use abridge::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .capacity_bytes(64 * 1024 * 1024)
///     .ttl(Duration::from_secs(3600));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum total bytes of cached payloads. Default: 1 GiB.
    pub capacity_bytes: NonZeroU64,
    /// Optional time-to-live, measured from insertion. Default: none.
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: NonZeroU64::new(DEFAULT_CAPACITY_BYTES).unwrap_or(NonZeroU64::MIN),
            ttl: None,
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the byte capacity. Zero is clamped to one byte.
    pub fn capacity_bytes(mut self, bytes: u64) -> Self {
        self.capacity_bytes = NonZeroU64::new(bytes).unwrap_or(NonZeroU64::MIN);
        self
    }

    /// Expire entries this long after insertion.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Deterministic fingerprint of `(operation, source text)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    operation: OperationKind,
    digest: [u8; 32],
}

impl CacheKey {
    /// Compute the key for a request.
    ///
    /// SHA-256 keeps the key stable across processes, so it can be shared
    /// with an external store later without changing its meaning.
    pub fn new(operation: OperationKind, source_text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(operation.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(source_text.as_bytes());
        Self {
            operation,
            digest: hasher.finalize().into(),
        }
    }

    pub fn operation(&self) -> OperationKind {
        self.operation
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.operation)?;
        for byte in &self.digest {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({self})")
    }
}

struct Entry {
    payload: Payload,
    size_bytes: u64,
    created_at: Instant,
    last_accessed_at: Instant,
}

struct Inner {
    entries: LruCache<CacheKey, Entry>,
    used_bytes: u64,
}

impl Inner {
    fn remove(&mut self, key: &CacheKey) -> Option<Entry> {
        let entry = self.entries.pop(key)?;
        self.used_bytes -= entry.size_bytes;
        Some(entry)
    }
}

/// In-memory, byte-bounded LRU cache of generation results.
pub struct ResponseCache {
    inner: Mutex<Inner>,
    capacity_bytes: u64,
    ttl: Option<Duration>,
}

impl ResponseCache {
    /// Create a new response cache with the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                used_bytes: 0,
            }),
            capacity_bytes: config.capacity_bytes.get(),
            ttl: config.ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a cached payload, refreshing its recency on a hit.
    ///
    /// Returns `None` on a miss or when the entry has outlived its TTL.
    /// Emits cache hit/miss metrics.
    pub fn get(&self, key: &CacheKey) -> Option<Payload> {
        let operation = key.operation().as_str();
        let now = Instant::now();
        let mut inner = self.lock();

        if let Some(entry) = inner.entries.get_mut(key) {
            let expired = self
                .ttl
                .is_some_and(|ttl| now.duration_since(entry.created_at) >= ttl);
            if !expired {
                entry.last_accessed_at = now;
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "operation" => operation)
                    .increment(1);
                return Some(entry.payload.clone());
            }
        } else {
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "operation" => operation)
                .increment(1);
            return None;
        }

        inner.remove(key);
        debug!(%key, "dropped expired cache entry");
        metrics::gauge!(telemetry::CACHE_BYTES).set(inner.used_bytes as f64);
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "operation" => operation).increment(1);
        None
    }

    /// Insert a payload of `size_bytes`, evicting least-recently-used
    /// entries until it fits.
    ///
    /// Returns `false` (and caches nothing) when the entry alone exceeds
    /// the total capacity. Re-inserting an existing key replaces it.
    pub fn put(&self, key: CacheKey, payload: Payload, size_bytes: usize) -> bool {
        let size_bytes = size_bytes as u64;
        if size_bytes > self.capacity_bytes {
            debug!(
                %key,
                size_bytes,
                capacity_bytes = self.capacity_bytes,
                "entry larger than cache capacity, not cached"
            );
            return false;
        }

        let now = Instant::now();
        let mut inner = self.lock();
        inner.remove(&key);

        while inner.used_bytes + size_bytes > self.capacity_bytes {
            let Some((evicted_key, evicted)) = inner.entries.pop_lru() else {
                break;
            };
            inner.used_bytes -= evicted.size_bytes;
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL).increment(1);
            debug!(
                key = %evicted_key,
                size_bytes = evicted.size_bytes,
                idle_ms = now.duration_since(evicted.last_accessed_at).as_millis() as u64,
                "evicted cache entry"
            );
        }

        inner.entries.push(
            key,
            Entry {
                payload,
                size_bytes,
                created_at: now,
                last_accessed_at: now,
            },
        );
        inner.used_bytes += size_bytes;
        metrics::gauge!(telemetry::CACHE_BYTES).set(inner.used_bytes as f64);
        true
    }

    /// Insert a payload using its own [`Payload::size_bytes()`] estimate.
    pub fn put_payload(&self, key: CacheKey, payload: Payload) -> bool {
        let size = payload.size_bytes();
        self.put(key, payload, size)
    }

    /// Whether `key` is currently cached, without touching recency.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().entries.contains(key)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes held by live entries.
    pub fn used_bytes(&self) -> u64 {
        self.lock().used_bytes
    }

    /// Configured capacity in bytes.
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    /// Evict all entries.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.used_bytes = 0;
        metrics::gauge!(telemetry::CACHE_BYTES).set(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_deterministic() {
        let k1 = CacheKey::new(OperationKind::Summarize, "hello");
        let k2 = CacheKey::new(OperationKind::Summarize, "hello");
        assert_eq!(k1, k2);
    }

    #[test]
    fn cache_key_differs_on_operation() {
        let k1 = CacheKey::new(OperationKind::Summarize, "hello");
        let k2 = CacheKey::new(OperationKind::Mindmap, "hello");
        assert_ne!(k1, k2);
    }

    #[test]
    fn cache_key_differs_on_input() {
        let k1 = CacheKey::new(OperationKind::Summarize, "hello");
        let k2 = CacheKey::new(OperationKind::Summarize, "world");
        assert_ne!(k1, k2);
    }

    #[test]
    fn cache_key_display_is_hex() {
        let key = CacheKey::new(OperationKind::Mindmap, "x").to_string();
        assert!(key.starts_with("mindmap:"));
        assert_eq!(key.len(), "mindmap:".len() + 64);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let config = CacheConfig::new().capacity_bytes(0);
        assert_eq!(config.capacity_bytes.get(), 1);
    }
}
