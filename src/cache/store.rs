//! Disk Cache Store
//!
//! Caches response records on local disk, one file per key, and keeps the
//! total payload size under a configured budget. Entries are evicted in the
//! order they were discovered or inserted, not by access recency.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, info, trace, warn};

use super::errors::CacheError;
use super::format::{read_header_file, read_record_file, write_header};
use super::key::file_name_for_key;
use super::loader::{LoadTask, Loader};
use super::record::{CacheIndexEntry, CacheRecord};
use crate::config::CacheConfig;

/// Extension of in-progress writes; such files are never records
const TEMP_EXTENSION: &str = "tmp";

/// In-memory mirror of the records on disk
#[derive(Debug, Default)]
struct Index {
    entries: HashMap<String, CacheIndexEntry>,
    /// Keys by insertion sequence, oldest first
    order: BTreeMap<u64, String>,
    next_seq: u64,
    total_size: u64,
    /// File names found at startup in a format this cache cannot read
    unreadable: HashSet<String>,
}

impl Index {
    fn get(&self, key: &str) -> Option<&CacheIndexEntry> {
        self.entries.get(key)
    }

    /// Insert or resize an entry. An existing key keeps its position.
    fn insert(&mut self, key: &str, size: u64) -> CacheIndexEntry {
        if let Some(entry) = self.entries.get_mut(key) {
            self.total_size = self.total_size - entry.size + size;
            entry.size = size;
            return entry.clone();
        }

        let entry = CacheIndexEntry {
            key: key.to_string(),
            size,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.total_size += size;
        self.order.insert(entry.seq, key.to_string());
        self.entries.insert(key.to_string(), entry.clone());
        entry
    }

    fn remove(&mut self, key: &str) -> Option<CacheIndexEntry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        self.total_size -= entry.size;
        Some(entry)
    }

    fn pop_oldest(&mut self) -> Option<CacheIndexEntry> {
        let (_, key) = self.order.pop_first()?;
        let entry = self.entries.remove(&key)?;
        self.total_size -= entry.size;
        Some(entry)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.unreadable.clear();
        self.total_size = 0;
    }
}

struct Inner {
    /// Root directory for cached files
    root_dir: PathBuf,
    /// Size budget in bytes
    max_size: u64,
    /// Pruning target as a fraction of the budget
    hysteresis: f64,
    loader_threads: usize,
    /// All index mutations go through this lock
    index: Mutex<Index>,
    loader: Loader,
    initialized: AtomicBool,
}

/// Size-bounded disk cache of response records
///
/// Construct one per cache directory and share it (it is `Send + Sync`).
/// Every operation is a plain blocking call; lookups for keys still being
/// indexed at startup wait for that key's load.
#[derive(Clone)]
pub struct DiskCache {
    inner: Arc<Inner>,
}

impl DiskCache {
    /// Create a cache from configuration. Call [`DiskCache::initialize`]
    /// before use to index existing files.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                root_dir: config.root_dir.clone(),
                max_size: config.max_size_bytes,
                hysteresis: config.hysteresis.clamp(f64::MIN_POSITIVE, 1.0),
                loader_threads: config.loader_threads.max(1),
                index: Mutex::new(Index::default()),
                loader: Loader::new(),
                initialized: AtomicBool::new(false),
            }),
        }
    }

    /// Create a cache at `root_dir` with a custom budget
    pub fn with_config(root_dir: impl Into<PathBuf>, max_size: u64) -> Self {
        Self::new(&CacheConfig {
            max_size_bytes: max_size,
            ..CacheConfig::with_dir(root_dir)
        })
    }

    /// Create and initialize in one step
    pub fn open(config: &CacheConfig) -> Self {
        let cache = Self::new(config);
        cache.initialize();
        cache
    }

    /// Index the cache directory
    ///
    /// Creates the directory if it is missing. Otherwise schedules every file
    /// for background header parsing and returns without waiting. Only the
    /// first call does anything.
    pub fn initialize(&self) {
        let inner = &self.inner;
        if inner.initialized.swap(true, Ordering::SeqCst) {
            return;
        }

        // Held while scheduling so lookups racing startup see the pending loads
        let guard = inner.index.lock();

        if !inner.root_dir.exists() {
            match fs::create_dir_all(&inner.root_dir) {
                Ok(()) => info!(cache_dir = %inner.root_dir.display(), "Created empty cache directory"),
                Err(e) => error!(
                    cache_dir = %inner.root_dir.display(),
                    error = %e,
                    "Unable to create cache directory"
                ),
            }
            return;
        }

        inner.cleanup();

        let tasks: Vec<LoadTask> = match fs::read_dir(&inner.root_dir) {
            Ok(read_dir) => read_dir
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.is_file() && !is_temp_file(path))
                .filter_map(|path| {
                    let file_name = path.file_name()?.to_str()?.to_string();
                    Some(LoadTask { file_name, path })
                })
                .collect(),
            Err(e) => {
                error!(cache_dir = %inner.root_dir.display(), error = %e, "Unable to scan cache directory");
                return;
            }
        };

        let count = tasks.len();
        info!(
            cache_dir = %inner.root_dir.display(),
            files = count,
            max_size_mb = inner.max_size / (1024 * 1024),
            "Loading cache index"
        );
        if count == 0 {
            return;
        }
        inner.loader.schedule(tasks);
        debug!(pending = inner.loader.pending_count(), "Scheduled cache index loads");

        let mut spawned = 0;
        for i in 0..inner.loader_threads.min(count) {
            let worker = Arc::clone(inner);
            let result = thread::Builder::new()
                .name(format!("cache-loader-{}", i))
                .spawn(move || worker.run_loader());
            match result {
                Ok(_) => spawned += 1,
                Err(e) => warn!(error = %e, "Failed to spawn cache loader thread"),
            }
        }

        drop(guard);
        if spawned == 0 {
            inner.run_loader();
        }
    }

    /// Get a copy of the record stored under `key`
    pub fn get(&self, key: &str) -> Option<CacheRecord> {
        let mut index = self.inner.lock_key(key);
        self.inner.get_locked(&mut index, key)
    }

    /// Store `record` under `key`, replacing any previous record
    pub fn put(&self, key: &str, record: CacheRecord) {
        let mut record = record;
        record.key = key.to_string();

        let mut index = self.inner.lock_key(key);
        self.inner.put_locked(&mut index, &record);
    }

    /// Remove the record stored under `key`
    pub fn remove(&self, key: &str) {
        let mut index = self.inner.lock_key(key);
        self.inner.remove_locked(&mut index, key);
    }

    /// Mark a record stale
    ///
    /// The soft expiry is always cleared; with `full_expire` the hard expiry
    /// is cleared too.
    pub fn invalidate(&self, key: &str, full_expire: bool) {
        let mut index = self.inner.lock_key(key);
        if let Some(mut record) = self.inner.get_locked(&mut index, key) {
            record.soft_ttl = -1;
            if full_expire {
                record.ttl = -1;
            }
            self.inner.put_locked(&mut index, &record);
            debug!(key = key, full_expire = full_expire, "Invalidated cache entry");
        }
    }

    /// Delete every record
    pub fn clear(&self) {
        self.inner.loader.wait_all();

        let mut index = self.inner.index.lock();
        if let Ok(read_dir) = fs::read_dir(&self.inner.root_dir) {
            for entry in read_dir.flatten() {
                let path = entry.path();
                if path.is_file() {
                    if let Err(e) = fs::remove_file(&path) {
                        warn!(path = %path.display(), error = %e, "Failed to delete cache file");
                    }
                }
            }
        }
        index.clear();
        info!(cache_dir = %self.inner.root_dir.display(), "Cache cleared");
    }

    /// Whether a record is indexed under `key`
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.lock_key(key).get(key).is_some()
    }

    /// Total payload bytes currently indexed
    pub fn total_size(&self) -> u64 {
        self.inner.index.lock().total_size
    }

    /// Number of indexed records
    pub fn len(&self) -> usize {
        self.inner.index.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the startup scan has been fully indexed
    pub fn is_loaded(&self) -> bool {
        self.inner.loader.is_loaded()
    }

    /// Block until the startup scan has been fully indexed
    pub fn wait_for_load(&self) {
        self.inner.loader.wait_all();
    }

    /// Index entries, oldest first
    pub fn entries(&self) -> Vec<CacheIndexEntry> {
        let index = self.inner.index.lock();
        index
            .order
            .values()
            .filter_map(|key| index.entries.get(key).cloned())
            .collect()
    }

    /// Get the cache directory path
    pub fn root_dir(&self) -> &Path {
        &self.inner.root_dir
    }

    /// Path of the file backing `key`
    pub fn file_for_key(&self, key: &str) -> PathBuf {
        self.inner.file_for_key(key)
    }
}

impl Inner {
    fn file_for_key(&self, key: &str) -> PathBuf {
        self.root_dir.join(file_name_for_key(key))
    }

    /// Lock the index once no background load is pending for `key`
    fn lock_key(&self, key: &str) -> MutexGuard<'_, Index> {
        let file_name = file_name_for_key(key);
        loop {
            self.loader.wait_for(&file_name);
            let index = self.index.lock();
            if !self.loader.is_pending(&file_name) {
                return index;
            }
        }
    }

    fn get_locked(&self, index: &mut Index, key: &str) -> Option<CacheRecord> {
        if index.get(key).is_none() {
            self.prune_unreadable(index, key);
            trace!(key = key, "Cache MISS");
            return None;
        }

        let path = self.file_for_key(key);
        let result = read_record_file(&path).and_then(|record| {
            if record.key == key {
                Ok(record)
            } else {
                Err(CacheError::KeyMismatch {
                    expected: key.to_string(),
                    found: record.key,
                })
            }
        });

        match result {
            Ok(record) => {
                debug!(key = key, size = record.size(), "Cache HIT");
                Some(record)
            }
            Err(CacheError::OutOfResource(size)) => {
                error!(
                    key = key,
                    size = size,
                    path = %path.display(),
                    "Out of memory reading cached payload"
                );
                None
            }
            Err(e @ CacheError::KeyMismatch { .. }) => {
                debug!(key = key, error = %e, "Cache file belongs to another key");
                index.remove(key);
                None
            }
            Err(e) if e.is_corruption() => {
                debug!(key = key, path = %path.display(), error = %e, "Pruning unreadable cache file");
                self.remove_locked(index, key);
                None
            }
            Err(e) => {
                warn!(key = key, error = %e, "Cache read failed");
                None
            }
        }
    }

    fn put_locked(&self, index: &mut Index, record: &CacheRecord) {
        let key = record.key.as_str();
        self.prune_if_needed(index, record.size());

        let path = self.file_for_key(key);
        match self.write_record(&path, record) {
            Ok(()) => {
                index.unreadable.remove(&file_name_for_key(key));
                index.insert(key, record.size());
                debug!(
                    key = key,
                    size = record.size(),
                    total_size = index.total_size,
                    "Stored record in cache"
                );
            }
            Err(e) => {
                warn!(key = key, path = %path.display(), error = %e, "Failed to write cache file");
            }
        }
    }

    fn remove_locked(&self, index: &mut Index, key: &str) {
        let path = self.file_for_key(key);
        if let Err(e) = fs::remove_file(&path) {
            debug!(key = key, path = %path.display(), error = %e, "Could not delete cache file");
        }
        index.unreadable.remove(&file_name_for_key(key));
        index.remove(key);
    }

    /// Delete the file behind `key` if the startup scan could not read it
    fn prune_unreadable(&self, index: &mut Index, key: &str) {
        if !index.unreadable.remove(&file_name_for_key(key)) {
            return;
        }
        let path = self.file_for_key(key);
        match fs::remove_file(&path) {
            Ok(()) => debug!(key = key, path = %path.display(), "Pruned cache file with unknown format"),
            Err(e) => warn!(key = key, path = %path.display(), error = %e, "Failed to delete cache file"),
        }
    }

    /// Write header and payload to a temp file, then move it over `path`
    ///
    /// On failure the temp file is dropped and the old record is untouched.
    fn write_record(&self, path: &Path, record: &CacheRecord) -> Result<(), CacheError> {
        fs::create_dir_all(&self.root_dir)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".")
            .suffix(&format!(".{}", TEMP_EXTENSION))
            .tempfile_in(&self.root_dir)?;

        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            write_header(&mut writer, record)?;
            writer.write_all(&record.data)?;
            writer.flush()?;
        }

        tmp.persist(path).map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }

    /// Evict the oldest entries before writing `needed` more bytes
    ///
    /// Runs only once the startup scan is indexed; until then writes may push
    /// the cache over budget. When the write would exceed the budget, entries
    /// are evicted in insertion order until the current total is at most
    /// `max_size * hysteresis`.
    fn prune_if_needed(&self, index: &mut Index, needed: u64) {
        if !self.loader.is_loaded() {
            return;
        }
        if index.total_size + needed <= self.max_size {
            return;
        }

        let target = (self.max_size as f64 * self.hysteresis) as u64;
        let before = index.total_size;
        let started = Instant::now();
        let mut pruned_files = 0;

        while index.total_size > target {
            let Some(entry) = index.pop_oldest() else {
                break;
            };
            let path = self.file_for_key(&entry.key);
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "Failed to evict cached file");
            } else {
                debug!(key = %entry.key, size = entry.size, "Evicted cached file");
            }
            pruned_files += 1;
        }

        if pruned_files > 0 {
            info!(
                pruned_files = pruned_files,
                pruned_bytes = before - index.total_size,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Pruned cache entries"
            );
        }
    }

    /// Drain the load queue, publishing each parsed header into the index
    fn run_loader(&self) {
        while let Some(task) = self.loader.next_task() {
            let result = self.load_file(&task);
            self.loader.finish(&task.file_name, result);
        }
    }

    /// Parse one file off-lock and publish it under the index lock
    fn load_file(&self, task: &LoadTask) -> Option<CacheIndexEntry> {
        let path = task.path.as_path();
        match read_header_file(path) {
            Ok((header, size)) => {
                let mut index = self.index.lock();
                let entry = match index.get(&header.key) {
                    Some(existing) => existing.clone(),
                    None => index.insert(&header.key, size),
                };
                trace!(key = %entry.key, size = entry.size, "Indexed cache file");
                Some(entry)
            }
            Err(CacheError::BadMagic(magic)) => {
                // the key is unknown until a lookup names this file
                debug!(path = %path.display(), magic = magic, "Deferring cache file with unknown format");
                self.index.lock().unreadable.insert(task.file_name.clone());
                None
            }
            Err(e) if e.is_corruption() => {
                debug!(path = %path.display(), error = %e, "Deleting unreadable cache file");
                if let Err(e) = fs::remove_file(path) {
                    warn!(path = %path.display(), error = %e, "Failed to delete cache file");
                }
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read cache file");
                None
            }
        }
    }

    /// Remove temp files left by interrupted writes
    fn cleanup(&self) {
        if let Ok(read_dir) = fs::read_dir(&self.root_dir) {
            for entry in read_dir.flatten() {
                let path = entry.path();
                if is_temp_file(&path) {
                    debug!(path = %path.display(), "Removing stale temp file");
                    if let Err(e) = fs::remove_file(&path) {
                        warn!(path = %path.display(), error = %e, "Failed to delete temp file");
                    }
                }
            }
        }
    }
}

fn is_temp_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == TEMP_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::format::CACHE_MAGIC;
    use crate::http::Headers;
    use tempfile::TempDir;

    fn create_test_cache(max_size: u64) -> (DiskCache, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = DiskCache::with_config(temp_dir.path().join("cache"), max_size);
        cache.initialize();
        (cache, temp_dir)
    }

    fn record(size: usize) -> CacheRecord {
        let mut response_headers = Headers::new();
        response_headers.insert("Content-Type".into(), "application/json".into());
        CacheRecord {
            key: String::new(),
            data: vec![7u8; size],
            etag: Some("\"etag\"".into()),
            server_date: 1_000,
            last_modified: 500,
            ttl: 10_000,
            soft_ttl: 5_000,
            response_headers,
        }
    }

    fn keys(cache: &DiskCache) -> Vec<String> {
        cache.entries().into_iter().map(|e| e.key).collect()
    }

    #[test]
    fn test_initialize_creates_missing_directory() {
        let (cache, _temp_dir) = create_test_cache(1024);
        assert!(cache.root_dir().is_dir());
        assert!(cache.is_empty());
        assert!(cache.is_loaded());
    }

    #[test]
    fn test_put_get_round_trip() {
        let (cache, _temp_dir) = create_test_cache(1024);
        cache.put("k", record(10));

        let got = cache.get("k").expect("record should be cached");
        let mut expected = record(10);
        expected.key = "k".into();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_get_returns_copy() {
        let (cache, _temp_dir) = create_test_cache(1024);
        cache.put("k", record(4));

        let mut first = cache.get("k").unwrap();
        first.data.clear();
        first.ttl = 0;

        let second = cache.get("k").unwrap();
        assert_eq!(second.data.len(), 4);
        assert_eq!(second.ttl, 10_000);
    }

    #[test]
    fn test_missing_key() {
        let (cache, _temp_dir) = create_test_cache(1024);
        assert!(cache.get("nope").is_none());
        assert!(!cache.contains_key("nope"));
    }

    #[test]
    fn test_size_accounting_on_overwrite() {
        let (cache, _temp_dir) = create_test_cache(1024);
        cache.put("a", record(10));
        cache.put("b", record(20));
        assert_eq!(cache.total_size(), 30);

        cache.put("a", record(25));
        assert_eq!(cache.total_size(), 45);
        assert_eq!(keys(&cache), vec!["a", "b"]);

        cache.remove("b");
        assert_eq!(cache.total_size(), 25);
        assert!(!cache.file_for_key("b").exists());
    }

    #[test]
    fn test_eviction_in_insertion_order() {
        let (cache, _temp_dir) = create_test_cache(100);
        cache.put("A", record(40));
        cache.put("B", record(40));
        cache.put("C", record(40));
        assert_eq!(cache.total_size(), 120);

        cache.put("D", record(40));
        assert_eq!(keys(&cache), vec!["B", "C", "D"]);
        assert_eq!(cache.total_size(), 120);
        assert!(!cache.file_for_key("A").exists());

        cache.put("E", record(40));
        assert_eq!(keys(&cache), vec!["C", "D", "E"]);
    }

    #[test]
    fn test_eviction_ignores_access_recency() {
        let (cache, _temp_dir) = create_test_cache(100);
        cache.put("A", record(40));
        cache.put("B", record(40));
        cache.put("C", record(40));

        // reading A does not protect it
        assert!(cache.get("A").is_some());
        cache.put("D", record(40));
        assert!(cache.get("A").is_none());
        assert!(cache.get("B").is_some());
    }

    #[test]
    fn test_invalidate_soft_and_full() {
        let (cache, _temp_dir) = create_test_cache(1024);
        cache.put("k", record(3));

        cache.invalidate("k", false);
        let soft = cache.get("k").unwrap();
        assert_eq!(soft.soft_ttl, -1);
        assert_eq!(soft.ttl, 10_000);

        cache.invalidate("k", true);
        let full = cache.get("k").unwrap();
        assert_eq!((full.soft_ttl, full.ttl), (-1, -1));
        assert_eq!(full.data, vec![7u8; 3]);

        // absent keys are left alone
        cache.invalidate("other", true);
        assert!(cache.get("other").is_none());
    }

    #[test]
    fn test_corrupt_file_is_pruned_on_get() {
        let (cache, _temp_dir) = create_test_cache(1024);
        cache.put("k", record(8));
        fs::write(cache.file_for_key("k"), b"garbage").unwrap();

        assert!(cache.get("k").is_none());
        assert!(!cache.file_for_key("k").exists());
        assert!(!cache.contains_key("k"));
        assert_eq!(cache.total_size(), 0);
    }

    #[test]
    fn test_truncated_header_is_pruned() {
        let (cache, _temp_dir) = create_test_cache(1024);
        cache.put("k", record(8));
        let path = cache.file_for_key("k");
        let bytes = fs::read(&path).unwrap();
        // cuts through the payload and into the last header value
        fs::write(&path, &bytes[..bytes.len() - 12]).unwrap();

        assert!(cache.get("k").is_none());
        assert!(!path.exists());
        assert_eq!(cache.total_size(), 0);
    }

    #[test]
    fn test_clear_removes_everything() {
        let (cache, _temp_dir) = create_test_cache(1024);
        cache.put("a", record(5));
        cache.put("b", record(5));

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_size(), 0);
        assert_eq!(fs::read_dir(cache.root_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_reopen_indexes_existing_files() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().join("cache");
        {
            let cache = DiskCache::with_config(&root, 1024);
            cache.initialize();
            cache.put("a", record(5));
            cache.put("b", record(7));
        }

        let cache = DiskCache::with_config(&root, 1024);
        cache.initialize();
        assert_eq!(cache.get("b").unwrap().data.len(), 7);
        assert!(cache.contains_key("a"));
        assert_eq!(cache.total_size(), 12);
    }

    #[test]
    fn test_startup_scan_deletes_unreadable_but_keeps_foreign_format() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().join("cache");
        fs::create_dir_all(&root).unwrap();

        let truncated = root.join("truncated");
        fs::write(&truncated, CACHE_MAGIC.to_le_bytes()).unwrap();
        let foreign = root.join("foreign");
        fs::write(&foreign, b"\x00\x00\x00\x01not ours").unwrap();
        let stale_tmp = root.join(".abc.tmp");
        fs::write(&stale_tmp, b"partial").unwrap();

        let cache = DiskCache::with_config(&root, 1024);
        cache.initialize();
        cache.wait_for_load();

        assert!(!truncated.exists());
        assert!(foreign.exists());
        assert!(!stale_tmp.exists());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_foreign_format_is_pruned_on_first_get() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().join("cache");
        fs::create_dir_all(&root).unwrap();

        let cache = DiskCache::with_config(&root, 1024);
        let path = cache.file_for_key("k");
        fs::write(&path, b"\xde\xad\xbe\xefsomething else").unwrap();
        let other = cache.file_for_key("other");
        fs::write(&other, b"\xde\xad\xbe\xefalso foreign").unwrap();

        cache.initialize();
        cache.wait_for_load();
        assert!(path.exists());

        assert!(cache.get("k").is_none());
        assert!(!path.exists());
        assert!(other.exists());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_transient_read_error_keeps_entry() {
        let (cache, _temp_dir) = create_test_cache(1024);
        cache.put("k", record(5));

        // a directory in place of the record fails the read without being corrupt
        let path = cache.file_for_key("k");
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        assert!(cache.get("k").is_none());
        assert!(path.is_dir());
        assert!(cache.contains_key("k"));
        assert_eq!(cache.total_size(), 5);
    }

    #[test]
    fn test_missing_file_drops_index_entry() {
        let (cache, _temp_dir) = create_test_cache(1024);
        cache.put("k", record(5));
        fs::remove_file(cache.file_for_key("k")).unwrap();

        assert!(cache.get("k").is_none());
        assert!(!cache.contains_key("k"));
        assert_eq!(cache.total_size(), 0);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let (cache, _temp_dir) = create_test_cache(1024);
        cache.put("a", record(5));
        cache.initialize();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_size(), 5);
    }

    #[test]
    fn test_failed_write_keeps_previous_record() {
        let (cache, _temp_dir) = create_test_cache(1024);
        cache.put("k", record(5));

        // a plain file in place of the cache directory makes the write fail
        let blocker = cache.root_dir().to_path_buf();
        let moved = blocker.with_extension("moved");
        fs::rename(&blocker, &moved).unwrap();
        fs::write(&blocker, b"not a directory").unwrap();

        cache.put("k", record(50));
        assert_eq!(cache.total_size(), 5);

        fs::remove_file(&blocker).unwrap();
        fs::rename(&moved, &blocker).unwrap();
        assert_eq!(cache.get("k").unwrap().data.len(), 5);
    }
}
