use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Process-wide whole-file cache, bounded by a byte budget.
///
/// There is deliberately no eviction and no refresh: once a path's bytes are
/// inserted they are served for the rest of the process lifetime even if the
/// file changes on disk, and a full cache simply stops accepting entries.
/// Entries are `Bytes` so a hit hands out a refcounted view, not a copy.
///
/// All connection tasks interleave on the reactor thread, but the cache is
/// shared behind an `Arc`, so the map and its size counter live under one
/// mutex; `put` is a single check-then-insert critical section and the
/// budget can never be exceeded by concurrent inserts.
pub struct FileCache {
    budget: u64,
    inner: Mutex<Inner>,
}

struct Inner {
    map: HashMap<PathBuf, Bytes>,
    size: u64,
}

impl FileCache {
    /// A budget of 0 disables caching entirely: every `put` is rejected.
    pub fn new(budget: u64) -> Self {
        Self {
            budget,
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                size: 0,
            }),
        }
    }

    pub fn get(&self, path: &Path) -> Option<Bytes> {
        let inner = self.inner.lock().unwrap();
        inner.map.get(path).cloned()
    }

    /// Inserts `content` under `path` if it fits in the remaining budget.
    /// Returns `false` (a no-op, not an error) when it does not fit or the
    /// path is already present.
    pub fn put(&self, path: &Path, content: Bytes) -> bool {
        if self.budget == 0 {
            return false;
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.map.contains_key(path) {
            return false;
        }
        let len = content.len() as u64;
        if inner.size + len > self.budget {
            return false;
        }
        inner.map.insert(path.to_path_buf(), content);
        inner.size += len;
        true
    }

    /// Total bytes currently resident.
    pub fn size(&self) -> u64 {
        self.inner.lock().unwrap().size
    }
}
