//! Keyed persistent storage of [`CompilationState`].
//!
//! Each key (typically a task path such as `:app:compileCpp`) maps to one
//! state file under `<cache_dir>/state/`. Writes go to a temporary file that is
//! renamed over the target, so readers never observe a partial state, and
//! concurrent writers to the same key are serialized by a per-key lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cdep_common::ContentHash;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::codec::{decode_state, encode_state};
use crate::error::CacheError;
use crate::state::CompilationState;

/// Subdirectory of the cache directory holding state files.
const STATE_SUBDIR: &str = "state";

/// File extension for state files.
const STATE_EXT: &str = "state";

/// On-disk store of compilation states, keyed by task path.
pub struct StateStore {
    /// Root cache directory.
    cache_dir: PathBuf,

    /// Tool version recorded in and required of every state file.
    tool_version: String,

    /// One lock per key, created on first use.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl StateStore {
    /// Creates a store rooted at `cache_dir`. Nothing is created on disk until
    /// the first [`store`](Self::store).
    pub fn new(cache_dir: &Path, tool_version: &str) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
            tool_version: tool_version.to_string(),
            locks: DashMap::new(),
        }
    }

    /// Returns the file that holds the state for `key`.
    pub fn state_path(&self, key: &str) -> PathBuf {
        let name = ContentHash::from_bytes(key.as_bytes());
        self.cache_dir
            .join(STATE_SUBDIR)
            .join(format!("{name}.{STATE_EXT}"))
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Loads the state for `key`.
    ///
    /// Returns an empty state if nothing was stored or the stored state cannot
    /// be decoded. This is fail-safe: the caller simply recompiles everything.
    pub fn load(&self, key: &str) -> CompilationState {
        let path = self.state_path(key);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(key, "no previous compilation state");
                return CompilationState::empty();
            }
            Err(e) => {
                warn!(key, path = %path.display(), error = %e, "cannot read compilation state; starting fresh");
                return CompilationState::empty();
            }
        };
        match decode_state(&raw, &self.tool_version) {
            Ok(state) => {
                debug!(key, files = state.len(), "loaded compilation state");
                state
            }
            Err(e) => {
                warn!(key, path = %path.display(), error = %e, "discarding unusable compilation state");
                CompilationState::empty()
            }
        }
    }

    /// Atomically replaces the state for `key`.
    pub fn store(&self, key: &str, state: &CompilationState) -> Result<(), CacheError> {
        let lock = self.lock_for(key);
        let _guard = lock.lock();

        let path = self.state_path(key);
        let dir = self.cache_dir.join(STATE_SUBDIR);
        std::fs::create_dir_all(&dir).map_err(|e| CacheError::Io {
            path: dir.clone(),
            source: e,
        })?;

        let bytes = encode_state(state, &self.tool_version)?;
        let tmp = path.with_extension(format!("{STATE_EXT}.tmp.{}", std::process::id()));
        std::fs::write(&tmp, &bytes).map_err(|e| CacheError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(CacheError::Io { path, source: e });
        }
        debug!(key, files = state.len(), "stored compilation state");
        Ok(())
    }

    /// Deletes the state for `key`. Returns `true` if a state file existed.
    pub fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let lock = self.lock_for(key);
        let _guard = lock.lock();

        let path = self.state_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::Io { path, source: e }),
        }
    }
}

/// A single persisted value, read at the start of a build and replaced at the
/// end of a successful one.
pub trait PersistentStateCache: Send + Sync {
    /// Returns the stored state, or an empty one.
    fn get(&self) -> CompilationState;

    /// Replaces the stored state.
    fn set(&self, state: &CompilationState) -> Result<(), CacheError>;
}

/// The [`PersistentStateCache`] for one key of a [`StateStore`].
pub struct TaskStateCache {
    store: Arc<StateStore>,
    key: String,
}

impl TaskStateCache {
    /// Returns the key this cache reads and writes.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl PersistentStateCache for TaskStateCache {
    fn get(&self) -> CompilationState {
        self.store.load(&self.key)
    }

    fn set(&self, state: &CompilationState) -> Result<(), CacheError> {
        self.store.store(&self.key, state)
    }
}

/// Hands out per-task caches backed by a shared [`StateStore`].
#[derive(Clone)]
pub struct StateCacheFactory {
    store: Arc<StateStore>,
}

impl StateCacheFactory {
    /// Creates a factory over `store`.
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    /// Returns the cache for `task_path`.
    pub fn create(&self, task_path: &str) -> TaskStateCache {
        TaskStateCache {
            store: Arc::clone(&self.store),
            key: task_path.to_string(),
        }
    }
}

/// A [`PersistentStateCache`] that lives only in memory.
#[derive(Default)]
pub struct InMemoryStateCache {
    state: Mutex<Option<CompilationState>>,
}

impl InMemoryStateCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistentStateCache for InMemoryStateCache {
    fn get(&self) -> CompilationState {
        self.state.lock().clone().unwrap_or_default()
    }

    fn set(&self, state: &CompilationState) -> Result<(), CacheError> {
        *self.state.lock() = Some(state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SourceFileState;
    use cdep_common::IncludeDirectives;
    use std::collections::BTreeMap;

    fn make_store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), "0.1.0");
        (dir, store)
    }

    fn one_file_state(body: &[u8]) -> CompilationState {
        let path = PathBuf::from("/src/a.c");
        let mut files = BTreeMap::new();
        files.insert(
            path.clone(),
            SourceFileState {
                path: path.clone(),
                hash: ContentHash::from_bytes(body),
                directives: IncludeDirectives::default(),
                resolved: vec![],
            },
        );
        CompilationState::new(
            ContentHash::from_bytes(b"settings"),
            [path].into_iter().collect(),
            files,
        )
    }

    #[test]
    fn load_missing_is_empty() {
        let (_dir, store) = make_store();
        assert!(store.load(":app:compileC").is_empty());
    }

    #[test]
    fn store_then_load() {
        let (_dir, store) = make_store();
        let state = one_file_state(b"int a;");
        store.store(":app:compileC", &state).unwrap();
        assert_eq!(store.load(":app:compileC"), state);
    }

    #[test]
    fn keys_are_independent() {
        let (_dir, store) = make_store();
        store.store(":a", &one_file_state(b"a")).unwrap();
        assert!(store.load(":b").is_empty());
        assert_ne!(store.state_path(":a"), store.state_path(":b"));
    }

    #[test]
    fn store_replaces_previous() {
        let (_dir, store) = make_store();
        store.store(":a", &one_file_state(b"first")).unwrap();
        let second = one_file_state(b"second");
        store.store(":a", &second).unwrap();
        assert_eq!(store.load(":a"), second);
    }

    #[test]
    fn store_leaves_no_temp_files() {
        let (dir, store) = make_store();
        store.store(":a", &one_file_state(b"a")).unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path().join(STATE_SUBDIR))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries, vec![store.state_path(":a")]);
    }

    #[test]
    fn corrupt_state_loads_empty() {
        let (_dir, store) = make_store();
        let path = store.state_path(":a");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"garbage data that is not a state").unwrap();
        assert!(store.load(":a").is_empty());
    }

    #[test]
    fn other_tool_version_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        StateStore::new(dir.path(), "0.1.0")
            .store(":a", &one_file_state(b"a"))
            .unwrap();
        assert!(StateStore::new(dir.path(), "0.2.0").load(":a").is_empty());
    }

    #[test]
    fn remove_deletes_state() {
        let (_dir, store) = make_store();
        store.store(":a", &one_file_state(b"a")).unwrap();
        assert!(store.remove(":a").unwrap());
        assert!(!store.remove(":a").unwrap());
        assert!(store.load(":a").is_empty());
    }

    #[test]
    fn concurrent_stores_to_one_key() {
        let (_dir, store) = make_store();
        let store = Arc::new(store);
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.store(":a", &one_file_state(&[i])).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let loaded = store.load(":a");
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn factory_caches_share_store() {
        let dir = tempfile::tempdir().unwrap();
        let factory = StateCacheFactory::new(Arc::new(StateStore::new(dir.path(), "0.1.0")));
        let cache = factory.create(":app:depend");
        assert_eq!(cache.key(), ":app:depend");
        let state = one_file_state(b"x");
        cache.set(&state).unwrap();
        assert_eq!(factory.create(":app:depend").get(), state);
        assert!(factory.create(":other").get().is_empty());
    }

    #[test]
    fn in_memory_cache() {
        let cache = InMemoryStateCache::new();
        assert!(cache.get().is_empty());
        let state = one_file_state(b"x");
        cache.set(&state).unwrap();
        assert_eq!(cache.get(), state);
    }
}
