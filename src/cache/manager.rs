//! Cache manager for the datasets served to the web client
//!
//! Provides a `CacheManager` that keeps the latest value of every dataset in
//! memory and mirrors each one to a JSON file, so a restarted gateway can answer
//! from disk before its first refresh completes.

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};

/// Directory used when the platform cache directory cannot be determined
const FALLBACK_CACHE_DIR: &str = "cache_data";

/// One cached dataset held in memory
///
/// Value and timestamp share a struct so they are always replaced together.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    stored_at: SystemTime,
    /// Unique per write; a mirror write whose version is no longer current is dropped
    version: u64,
}

impl CacheEntry {
    fn age(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.stored_at)
            .unwrap_or(Duration::ZERO)
    }

    fn is_fresh(&self, max_age: Option<u64>) -> bool {
        max_age.map_or(true, |max| self.age().as_secs() <= max)
    }
}

/// Diagnostic view of a single cache key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStat {
    /// Seconds since the entry was written, rounded to two decimals
    pub age_seconds: f64,
    /// Same age expressed in minutes
    pub age_minutes: f64,
    /// Whether the stored document carries any content
    pub has_data: bool,
    /// Wall-clock time of the last write
    pub written_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Inner {
    cache_dir: PathBuf,
    entries: Mutex<HashMap<String, CacheEntry>>,
    /// Serializes mirror writes so the file always ends on the latest `set`
    disk_writes: Mutex<()>,
    versions: AtomicU64,
    temp_files: AtomicU64,
}

/// Thread-safe store of the most recent value for each dataset key
///
/// Cloning is cheap and every clone shares the same entries, so one instance is
/// built at startup and handed to the refresh worker and the HTTP layer alike.
/// Disk failures are logged and never returned: the key simply stays memory-only.
#[derive(Debug, Clone)]
pub struct CacheManager {
    inner: Arc<Inner>,
}

impl CacheManager {
    /// Creates a CacheManager rooted in the platform cache directory
    ///
    /// Uses `~/.cache/marketgate/` on Linux, falling back to `./cache_data` when no
    /// home directory is available.
    pub fn new() -> Self {
        Self::with_dir(Self::default_dir())
    }

    /// Creates a CacheManager storing its mirror files in `cache_dir`
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache_dir,
                entries: Mutex::new(HashMap::new()),
                disk_writes: Mutex::new(()),
                versions: AtomicU64::new(0),
                temp_files: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the platform cache directory for this application
    pub fn default_dir() -> PathBuf {
        ProjectDirs::from("", "", "marketgate")
            .map(|dirs| dirs.cache_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(FALLBACK_CACHE_DIR))
    }

    /// Directory holding the mirror files
    pub fn cache_dir(&self) -> &Path {
        &self.inner.cache_dir
    }

    /// Returns the mirror file for a key
    ///
    /// Anything other than ASCII alphanumerics, `-`, `_` and `.` becomes `_`, so
    /// `skills:mage` is stored as `skills_mage.json`.
    fn cache_path(&self, key: &str) -> PathBuf {
        self.inner
            .cache_dir
            .join(format!("{}.json", sanitize_key(key)))
    }

    fn next_version(&self) -> u64 {
        self.inner.versions.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Reads a dataset
    ///
    /// Returns the in-memory value when present and, if `max_age` is given, no
    /// older than `max_age` seconds. Ages are counted in whole elapsed seconds, so
    /// an entry passes while it is fewer than `max_age + 1` whole seconds old and
    /// `Some(0)` accepts anything written less than a second ago.
    ///
    /// The disk mirror is consulted only for keys not held in memory. A loaded
    /// file is kept in memory stamped with its modification time and is returned
    /// only if that time also satisfies `max_age`. Absence is a normal result.
    pub fn get(&self, key: &str, max_age: Option<u64>) -> Option<Value> {
        {
            let entries = self.inner.entries.lock();
            if let Some(entry) = entries.get(key) {
                // The mirror never holds anything newer than memory.
                return entry.is_fresh(max_age).then(|| entry.value.clone());
            }
        }

        let (value, modified) = self.load_from_disk(key)?;

        let mut entries = self.inner.entries.lock();
        if let Some(current) = entries.get(key) {
            // A set landed while the file was being read; it wins.
            return current.is_fresh(max_age).then(|| current.value.clone());
        }

        let entry = CacheEntry {
            value,
            stored_at: modified,
            version: self.next_version(),
        };
        let result = entry.is_fresh(max_age).then(|| entry.value.clone());
        entries.insert(key.to_string(), entry);
        result
    }

    /// Stores a dataset and mirrors it to disk
    ///
    /// The in-memory entry is replaced under the lock; the file is written after
    /// the lock is released. A write overtaken by a later `set` on the same key
    /// is skipped. A failed write leaves the key memory-only.
    pub fn set(&self, key: &str, value: Value) {
        let encoded = serde_json::to_vec(&value);
        let version = self.next_version();

        {
            let mut entries = self.inner.entries.lock();
            let entry = CacheEntry {
                value,
                stored_at: SystemTime::now(),
                version,
            };
            entries.insert(key.to_string(), entry);
        }

        match encoded {
            Ok(bytes) => self.save_to_disk(key, version, &bytes),
            Err(e) => error!("Error encoding {} for disk cache: {}", key, e),
        }
    }

    /// Snapshot of every key currently held in memory
    pub fn stats(&self) -> BTreeMap<String, CacheStat> {
        let entries = self.inner.entries.lock();
        entries
            .iter()
            .map(|(key, entry)| {
                let age = entry.age().as_secs_f64();
                let stat = CacheStat {
                    age_seconds: round2(age),
                    age_minutes: round2(age / 60.0),
                    has_data: has_data(&entry.value),
                    written_at: DateTime::<Utc>::from(entry.stored_at),
                };
                (key.clone(), stat)
            })
            .collect()
    }

    fn load_from_disk(&self, key: &str) -> Option<(Value, SystemTime)> {
        let path = self.cache_path(key);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No disk cache for {}", key);
                return None;
            }
            Err(e) => {
                error!("Error loading {} from disk: {}", key, e);
                return None;
            }
        };

        let modified = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .unwrap_or_else(|_| SystemTime::now());

        match serde_json::from_slice::<Value>(&content) {
            Ok(Value::Null) => {
                warn!("Disk cache for {} is empty", key);
                None
            }
            Ok(value) => {
                info!("Loaded {} from disk cache", key);
                Some((value, modified))
            }
            Err(e) => {
                warn!("Corrupt disk cache for {}: {}", key, e);
                None
            }
        }
    }

    fn is_current(&self, key: &str, version: u64) -> bool {
        self.inner
            .entries
            .lock()
            .get(key)
            .is_some_and(|entry| entry.version == version)
    }

    fn save_to_disk(&self, key: &str, version: u64, bytes: &[u8]) {
        let _guard = self.inner.disk_writes.lock();
        if !self.is_current(key, version) {
            debug!("Skipping disk write for {}: superseded", key);
            return;
        }
        match self.write_file(key, bytes) {
            Ok(()) => info!("Saved {} to disk cache", key),
            Err(e) => error!("Error saving {} to disk: {}", key, e),
        }
    }

    /// Writes through a temporary file so readers never see a half-written mirror
    fn write_file(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.inner.cache_dir)?;

        let path = self.cache_path(key);
        let n = self.inner.temp_files.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("json.tmp{}", n));

        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path).inspect_err(|_| {
            let _ = fs::remove_file(&tmp);
        })
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps a cache key to a file-name-safe stem
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Whether a document carries content
///
/// `null`, `false`, zero, and empty strings, arrays or objects count as no data.
pub fn has_data(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;
    use std::time::Duration as StdDuration;
    use tempfile::TempDir;

    fn create_test_cache() -> (CacheManager, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = CacheManager::with_dir(temp_dir.path().to_path_buf());
        (cache, temp_dir)
    }

    #[test]
    fn test_get_returns_value_written_by_set() {
        let (cache, _temp_dir) = create_test_cache();
        let items = json!({"items": [{"item_name": "Sword", "class": "warrior"}]});

        cache.set("items", items.clone());

        assert_eq!(cache.get("items", None), Some(items));
    }

    #[test]
    fn test_get_returns_none_for_missing_key() {
        let (cache, _temp_dir) = create_test_cache();

        assert!(cache.get("nonexistent", None).is_none());
        assert!(cache.get("nonexistent", Some(60)).is_none());
    }

    #[test]
    fn test_set_writes_sanitized_mirror_file() {
        let (cache, temp_dir) = create_test_cache();

        cache.set("skills:mage", json!({"skills": ["fireball"]}));

        let expected_path = temp_dir.path().join("skills_mage.json");
        assert!(expected_path.exists(), "Mirror file should exist");
        let content = fs::read_to_string(&expected_path).expect("Should read file");
        assert!(content.contains("fireball"));
    }

    #[test]
    fn test_zero_max_age_accepts_fresh_write() {
        let (cache, _temp_dir) = create_test_cache();

        cache.set("shaders", json!(["glow"]));

        assert_eq!(cache.get("shaders", Some(0)), Some(json!(["glow"])));
    }

    #[test]
    fn test_max_age_expires_but_unbounded_get_still_returns() {
        let (cache, _temp_dir) = create_test_cache();

        cache.set("backs", json!(["cape"]));
        thread::sleep(StdDuration::from_millis(1100));

        assert!(cache.get("backs", Some(0)).is_none(), "Entry older than max_age");
        assert_eq!(cache.get("backs", None), Some(json!(["cape"])));
    }

    #[test]
    fn test_stale_entry_is_not_replaced_by_older_mirror() {
        let (cache, temp_dir) = create_test_cache();
        cache.set("items", json!({"v": 2}));
        // An earlier write reaching the mirror last
        fs::write(temp_dir.path().join("items.json"), r#"{"v": 1}"#).expect("Should write file");
        thread::sleep(StdDuration::from_millis(1100));

        assert!(cache.get("items", Some(0)).is_none());
        assert_eq!(cache.get("items", None), Some(json!({"v": 2})));
    }

    #[test]
    fn test_superseded_set_does_not_reach_disk() {
        let (cache, temp_dir) = create_test_cache();
        cache.set("items", json!({"v": 1}));
        let first = cache.inner.entries.lock()["items"].version;
        cache.set("items", json!({"v": 2}));

        // The first set's mirror write arriving late
        cache.save_to_disk("items", first, br#"{"v": 1}"#);

        let on_disk = fs::read_to_string(temp_dir.path().join("items.json"))
            .expect("Mirror file should exist");
        let on_disk: Value = serde_json::from_str(&on_disk).expect("Mirror should be JSON");
        assert_eq!(on_disk, json!({"v": 2}));
    }

    #[test]
    fn test_overwrite_existing_entry() {
        let (cache, _temp_dir) = create_test_cache();

        cache.set("chests", json!({"page": 1}));
        cache.set("chests", json!({"page": 2}));

        assert_eq!(cache.get("chests", None), Some(json!({"page": 2})));
    }

    #[test]
    fn test_fresh_store_warm_starts_from_disk() {
        let (cache, temp_dir) = create_test_cache();
        cache.set("listings:page1", json!({"listings": [1, 2, 3]}));

        let restarted = CacheManager::with_dir(temp_dir.path().to_path_buf());

        assert_eq!(
            restarted.get("listings:page1", None),
            Some(json!({"listings": [1, 2, 3]}))
        );
        assert!(
            restarted.stats().contains_key("listings:page1"),
            "Disk load should populate memory"
        );
    }

    #[test]
    fn test_corrupt_mirror_file_is_a_miss() {
        let (cache, temp_dir) = create_test_cache();
        fs::write(temp_dir.path().join("items.json"), "{not json").expect("Should write file");

        assert!(cache.get("items", None).is_none());
        assert!(cache.stats().is_empty());
    }

    #[test]
    fn test_unwritable_directory_degrades_to_memory_only() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, "file, not a directory").expect("Should write file");
        let cache = CacheManager::with_dir(blocker.join("cache"));

        cache.set("items", json!({"items": []}));

        assert_eq!(cache.get("items", None), Some(json!({"items": []})));
    }

    #[test]
    fn test_concurrent_writers_keep_their_last_write() {
        let (cache, temp_dir) = create_test_cache();
        let writers = 8;
        let writes = 50;

        thread::scope(|scope| {
            for w in 0..writers {
                let cache = cache.clone();
                scope.spawn(move || {
                    for m in 0..writes {
                        cache.set(&format!("key{}", w), json!({"writer": w, "write": m}));
                    }
                });
            }
            let reader = cache.clone();
            scope.spawn(move || {
                for _ in 0..writes {
                    let _ = reader.stats();
                    let _ = reader.get("key0", Some(60));
                }
            });
        });

        for w in 0..writers {
            let expected = json!({"writer": w, "write": writes - 1});
            assert_eq!(cache.get(&format!("key{}", w), None), Some(expected.clone()));

            let on_disk = fs::read_to_string(temp_dir.path().join(format!("key{}.json", w)))
                .expect("Mirror file should exist");
            let on_disk: Value = serde_json::from_str(&on_disk).expect("Mirror should be JSON");
            assert_eq!(on_disk, expected);
        }
    }

    #[test]
    fn test_stats_reports_age_and_content() {
        let (cache, _temp_dir) = create_test_cache();
        cache.set("items", json!({"items": [1]}));
        cache.set("backs", json!([]));

        let stats = cache.stats();

        assert_eq!(stats.len(), 2);
        assert!(stats["items"].has_data);
        assert!(!stats["backs"].has_data);
        assert!(stats["items"].age_seconds < 5.0);
        assert!(stats["items"].written_at <= Utc::now());
    }

    #[test]
    fn test_sanitize_key_replaces_separators() {
        assert_eq!(sanitize_key("skills:mage"), "skills_mage");
        assert_eq!(sanitize_key("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_key("listings:page1"), "listings_page1");
    }

    #[test]
    fn test_has_data_follows_truthiness() {
        assert!(!has_data(&Value::Null));
        assert!(!has_data(&json!({})));
        assert!(!has_data(&json!("")));
        assert!(!has_data(&json!(0)));
        assert!(has_data(&json!({"a": 1})));
        assert!(has_data(&json!([0])));
    }

    #[test]
    fn test_default_dir_names_application() {
        let dir = CacheManager::default_dir();
        let path_str = dir.to_string_lossy();
        assert!(path_str.contains("marketgate") || path_str.contains(FALLBACK_CACHE_DIR));
    }
}
