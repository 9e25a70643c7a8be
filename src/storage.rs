//! Client-side persistence: the durable key-value store and the TTL cache on top of it.

pub mod cache;
pub mod kv;

pub use cache::{CacheEntry, CacheLookup, LocalCache, CACHE_PREFIX};
pub use kv::{FileStorage, KvStorage, MemoryStorage, SharedStorage};
