//! Storage backends for the entity store.
//!
//! A backend is a set of namespaces holding JSON records keyed by string, plus
//! a plain-text area for scene prose. Each `put` replaces one record
//! atomically; there are no multi-record transactions.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Addressable record storage.
pub trait StoreBackend {
    /// Replace the record `key` in `namespace`.
    fn put(&mut self, namespace: &str, key: &str, value: &Value) -> Result<()>;

    fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>>;

    /// All records of a namespace, ordered by key.
    fn list(&self, namespace: &str) -> Result<Vec<(String, Value)>>;

    fn put_text(&mut self, key: &str, text: &str) -> Result<()>;

    fn get_text(&self, key: &str) -> Result<Option<String>>;
}

/// Process-local backend. Nothing survives the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    namespaces: BTreeMap<String, BTreeMap<String, Value>>,
    texts: BTreeMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreBackend for MemoryBackend {
    fn put(&mut self, namespace: &str, key: &str, value: &Value) -> Result<()> {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>> {
        Ok(self
            .namespaces
            .get(namespace)
            .and_then(|records| records.get(key))
            .cloned())
    }

    fn list(&self, namespace: &str) -> Result<Vec<(String, Value)>> {
        Ok(self
            .namespaces
            .get(namespace)
            .map(|records| {
                records
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn put_text(&mut self, key: &str, text: &str) -> Result<()> {
        self.texts.insert(key.to_string(), text.to_string());
        Ok(())
    }

    fn get_text(&self, key: &str) -> Result<Option<String>> {
        Ok(self.texts.get(key).cloned())
    }
}

/// One pretty-printed JSON file per record under `<root>/<namespace>/<key>.json`.
///
/// Scene prose lives under `<root>/text/<key>.txt`. Files are written to a
/// temporary sibling and renamed into place.
#[derive(Debug, Clone)]
pub struct JsonDirBackend {
    root: PathBuf,
}

impl JsonDirBackend {
    /// Open (creating if needed) a backend rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, namespace: &str, key: &str) -> PathBuf {
        self.root.join(namespace).join(format!("{}.json", key))
    }

    fn text_path(&self, key: &str) -> PathBuf {
        self.root.join("text").join(format!("{}.txt", key))
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

impl StoreBackend for JsonDirBackend {
    fn put(&mut self, namespace: &str, key: &str, value: &Value) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        write_atomic(&self.record_path(namespace, key), &bytes)
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>> {
        match read_optional(&self.record_path(namespace, key))? {
            Some(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            None => Ok(None),
        }
    }

    fn list(&self, namespace: &str) -> Result<Vec<(String, Value)>> {
        let dir = self.root.join(namespace);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let contents = fs::read_to_string(&path)?;
            records.push((key.to_string(), serde_json::from_str(&contents)?));
        }
        records.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(records)
    }

    fn put_text(&mut self, key: &str, text: &str) -> Result<()> {
        write_atomic(&self.text_path(key), text.as_bytes())
    }

    fn get_text(&self, key: &str) -> Result<Option<String>> {
        read_optional(&self.text_path(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exercise(backend: &mut dyn StoreBackend) {
        backend.put("character", "C1", &json!({"name": "Bob"})).unwrap();
        backend.put("character", "C0", &json!({"name": "Alice"})).unwrap();
        backend.put("character", "C0", &json!({"name": "Alicia"})).unwrap();

        assert_eq!(
            backend.get("character", "C0").unwrap(),
            Some(json!({"name": "Alicia"}))
        );
        assert_eq!(backend.get("character", "C9").unwrap(), None);
        assert_eq!(backend.get("scene", "S000").unwrap(), None);

        let keys: Vec<_> = backend
            .list("character")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["C0", "C1"]);
        assert!(backend.list("scene").unwrap().is_empty());

        backend.put_text("S000", "It was raining.").unwrap();
        assert_eq!(
            backend.get_text("S000").unwrap().as_deref(),
            Some("It was raining.")
        );
        assert_eq!(backend.get_text("S001").unwrap(), None);
    }

    #[test]
    fn test_memory_backend() {
        exercise(&mut MemoryBackend::new());
    }

    #[test]
    fn test_json_dir_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = JsonDirBackend::open(dir.path()).unwrap();
        exercise(&mut backend);

        assert!(dir.path().join("character").join("C0.json").exists());
        assert!(!dir.path().join("character").join("C0.tmp").exists());
        assert!(dir.path().join("text").join("S000.txt").exists());
    }
}
