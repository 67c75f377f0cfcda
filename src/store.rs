use crate::error::GalleyError;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// Persistent key-value store consumed by the font asset cache. Values are
/// idempotent per key (the same key always maps to the same bytes), so
/// concurrent writers racing to populate an entry are benign.
pub trait ByteStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn set(&self, key: &str, value: &[u8]) -> Result<(), GalleyError>;
    fn del(&self, key: &str);
}

/// Process-local store backed by a map. The default for tests and for
/// callers that accept re-fetching fonts every run.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ByteStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.lock().ok()?;
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), GalleyError> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.to_vec());
        }
        Ok(())
    }

    fn del(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }
}

/// File-backed store: one file per key under a root directory. Keys are
/// sanitized to a conservative filename alphabet before hitting the
/// filesystem.
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, GalleyError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '-' || ch == '.' {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(name)
    }
}

impl ByteStore for DirStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.path_for(key)).ok()
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), GalleyError> {
        fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn del(&self, key: &str) {
        let _ = fs::remove_file(self.path_for(key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_store_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("galley_{tag}_{}_{}", std::process::id(), nanos))
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get("k").is_none());
        store.set("k", b"v").expect("set");
        assert_eq!(store.get("k").as_deref(), Some(b"v".as_ref()));
        store.del("k");
        assert!(store.get("k").is_none());
    }

    #[test]
    fn dir_store_sanitizes_keys() {
        let store = DirStore::open(temp_store_dir("dirstore")).expect("open");
        store.set("fonts/noto@v3", b"bytes").expect("set");
        assert_eq!(store.get("fonts/noto@v3").as_deref(), Some(b"bytes".as_ref()));
        store.del("fonts/noto@v3");
        assert!(store.get("fonts/noto@v3").is_none());
    }
}
