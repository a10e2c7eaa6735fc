//! Striped per-key mutual exclusion.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use parking_lot::Mutex;

const DEFAULT_STRIPES: usize = 64;

/// Serializes work per key using a fixed table of locks.
///
/// Keys that hash to the same stripe share a lock, so two threads working on
/// the same key never overlap while threads on different keys usually run in
/// parallel. The closure passed to [`guard_by_key`](Self::guard_by_key) must
/// not re-enter the same guard.
#[derive(Debug)]
pub struct KeyGuard {
    stripes: Box<[Mutex<()>]>,
}

impl KeyGuard {
    /// Creates a guard with `stripes` locks (at least one).
    pub fn new(stripes: usize) -> Self {
        let stripes = (0..stripes.max(1)).map(|_| Mutex::new(())).collect();
        Self { stripes }
    }

    /// Creates a guard with the default stripe count.
    pub fn striped() -> Self {
        Self::new(DEFAULT_STRIPES)
    }

    /// Runs `f` while holding the lock for `key`.
    pub fn guard_by_key<K, T>(&self, key: &K, f: impl FnOnce() -> T) -> T
    where
        K: Hash + ?Sized,
    {
        let _lock = self.stripes[self.stripe(key)].lock();
        f()
    }

    fn stripe<K: Hash + ?Sized>(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }
}

impl Default for KeyGuard {
    fn default() -> Self {
        Self::striped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn returns_closure_value() {
        let guard = KeyGuard::striped();
        assert_eq!(guard.guard_by_key("a", || 42), 42);
    }

    #[test]
    fn zero_stripes_is_clamped() {
        let guard = KeyGuard::new(0);
        assert_eq!(guard.guard_by_key(&7u32, || "ok"), "ok");
    }

    #[test]
    fn same_key_is_serialized() {
        let guard = Arc::new(KeyGuard::new(4));
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = Arc::clone(&guard);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        guard.guard_by_key("shared", || {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_seen.fetch_max(now, Ordering::SeqCst);
                            inside.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
