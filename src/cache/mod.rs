//! Persistent response cache
//!
//! Size-bounded disk cache with one file per key. The in-memory index is
//! rebuilt at startup by a small pool of loader threads, and lookups for a
//! key that is still being indexed wait for that key only.

mod errors;
mod format;
pub mod key;
mod loader;
mod record;
mod store;

pub use format::CACHE_MAGIC;
pub use key::{cache_key, file_name_for_key};
pub use record::{CacheIndexEntry, CacheRecord};
pub use store::DiskCache;
