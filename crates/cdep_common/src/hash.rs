//! Content hashing for change detection across builds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::Path;

/// A 128-bit content hash computed using XXH3.
///
/// Two files with the same `ContentHash` are assumed to have identical content.
/// Snapshots of sources and headers record this hash so that the next build can
/// decide whether a file changed without re-parsing it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Computes a content hash from a byte slice using XXH3-128.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = xxhash_rust::xxh3::xxh3_128(data);
        Self(hash.to_le_bytes())
    }

    /// Parses the 32-character lowercase hex form produced by `Display`.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(s.get(i * 2..i * 2 + 2)?, 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// Produces content digests for files on disk.
///
/// The change-detection engine only ever asks for a file's hash through this
/// trait, so callers can substitute a hasher backed by an existing snapshot.
pub trait FileHasher: Send + Sync {
    /// Returns the content hash of the file at `path`.
    fn hash(&self, path: &Path) -> io::Result<ContentHash>;
}

/// Hashes the full byte content of a file with XXH3-128.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentHasher;

impl FileHasher for ContentHasher {
    fn hash(&self, path: &Path) -> io::Result<ContentHash> {
        let content = std::fs::read(path)?;
        Ok(ContentHash::from_bytes(&content))
    }
}
