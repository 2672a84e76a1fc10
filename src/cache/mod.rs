//! Caching subsystem.
//!
//! [`ResponseCache`] holds generation results keyed on a content hash of
//! `(operation, source text)`. It is a strict byte-bounded LRU: the sum of
//! entry sizes never exceeds the configured capacity. See the
//! [`response`] module docs for eviction and expiry rules.

pub mod response;

pub use response::{CacheConfig, CacheKey, ResponseCache};
