use crate::errors::UsherError;
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::PathBuf;

/// Per-user config values held by the backend.
///
/// Everything lives in memory; with a backing path configured, every write
/// is flushed to one JSON file so flags survive a restart. Unknown keys read
/// as the empty string, which engines treat as "never set".
pub struct UserConfigStore {
    values: DashMap<String, HashMap<String, String>>,
    path: Option<PathBuf>,
}

impl UserConfigStore {
    pub fn new() -> Self {
        UserConfigStore {
            values: DashMap::new(),
            path: None,
        }
    }

    /// Opens a file-backed store, loading whatever was persisted before. A
    /// missing file is an empty store, not an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, UsherError> {
        let path = path.into();
        let values = DashMap::new();
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                let loaded: HashMap<String, HashMap<String, String>> = serde_json::from_str(&text)?;
                for (user, entries) in loaded {
                    values.insert(user, entries);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(UserConfigStore {
            values,
            path: Some(path),
        })
    }

    pub fn get(&self, user: &str, key: &str) -> String {
        self.values
            .get(user)
            .and_then(|entries| entries.get(key).cloned())
            .unwrap_or_default()
    }

    pub fn get_all(&self, user: &str) -> HashMap<String, String> {
        self.values
            .get(user)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn set(&self, user: &str, key: &str, value: &str) -> Result<(), UsherError> {
        self.values
            .entry(user.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.flush()
    }

    pub fn set_many(&self, user: &str, entries: HashMap<String, String>) -> Result<(), UsherError> {
        self.values.entry(user.to_string()).or_default().extend(entries);
        self.flush()
    }

    fn flush(&self) -> Result<(), UsherError> {
        let Some(path) = &self.path else { return Ok(()) };
        let snapshot: HashMap<String, HashMap<String, String>> = self
            .values
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let text = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

impl Default for UserConfigStore {
    fn default() -> Self {
        UserConfigStore::new()
    }
}
