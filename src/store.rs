use crate::error::StoreError;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

/// Pointer key naming the most recently saved session state key.
pub const LAST_ACTIVE_QUIZ: &str = "lastActiveQuiz";

/// Pointer key naming the most recently completed quiz's result key.
pub const LAST_COMPLETED_QUIZ: &str = "lastCompletedQuiz";

/// Key/value store for session snapshots. Keys are the
/// `quizState_...`/`quizResult_...` strings plus the two pointer keys;
/// values are JSON documents with no versioning or expiry.
pub trait SessionStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn save(&self, key: &str, state: &Value) -> Result<(), StoreError>;
    fn clear(&self, key: &str) -> Result<(), StoreError>;

    fn set_pointer(&self, name: &str, key: &str) -> Result<(), StoreError> {
        self.save(name, &Value::String(key.to_string()))
    }

    fn pointer(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self.load(name)?.and_then(|v| v.as_str().map(str::to_string)))
    }
}

impl<S: SessionStore + ?Sized> SessionStore for std::sync::Arc<S> {
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        (**self).load(key)
    }

    fn save(&self, key: &str, state: &Value) -> Result<(), StoreError> {
        (**self).save(key, state)
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        (**self).clear(key)
    }
}

/// In-memory store for tests.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn save(&self, key: &str, state: &Value) -> Result<(), StoreError> {
        self.entries.lock().unwrap().insert(key.to_string(), state.clone());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

/// One pretty-printed JSON file per key under a data directory.
#[derive(Debug)]
pub struct FileSessionStore {
    root: PathBuf,
}

impl FileSessionStore {
    /// Opens (and creates) the store directory.
    pub fn open(root: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", sanitize_key(key)))
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, state: &Value) -> Result<(), StoreError> {
        let path = self.path_for(key);
        std::fs::write(&path, serde_json::to_string_pretty(state)?)?;
        debug!(target: "studyjoy::store", key, path = %path.display(), "session state saved");
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Storage keys become file names; anything outside `[A-Za-z0-9_-]` maps
/// to `_` so book titles with spaces or slashes stay filesystem-safe.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_awkward_keys() {
        assert_eq!(sanitize_key("quizState_My Book!_2_none"), "quizState_My_Book__2_none");
        assert_eq!(sanitize_key("lastActiveQuiz"), "lastActiveQuiz");
    }

    #[test]
    fn memory_store_round_trips_and_clears() {
        let store = MemorySessionStore::new();
        let value = serde_json::json!({"score": 3});

        store.save("quizState_b_none_none", &value).unwrap();
        assert_eq!(store.load("quizState_b_none_none").unwrap(), Some(value));

        store.clear("quizState_b_none_none").unwrap();
        assert_eq!(store.load("quizState_b_none_none").unwrap(), None);
    }

    #[test]
    fn pointers_are_plain_strings() {
        let store = MemorySessionStore::new();
        store.set_pointer(LAST_ACTIVE_QUIZ, "quizState_b_1_2").unwrap();
        assert_eq!(store.pointer(LAST_ACTIVE_QUIZ).unwrap().as_deref(), Some("quizState_b_1_2"));
        assert_eq!(store.pointer(LAST_COMPLETED_QUIZ).unwrap(), None);
    }
}
