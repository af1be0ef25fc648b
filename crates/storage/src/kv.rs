use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use snafu::{ResultExt, ensure};

use super::error::{
    CreateDirSnafu, InvalidKeySnafu, ReadFileSnafu, RenameTempFileSnafu, StorageResult,
    WriteFileSnafu,
};

/// Durable string values addressed by key.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;
}

pub fn validate_key(key: &str) -> StorageResult<()> {
    ensure!(
        !key.is_empty()
            && key
                .chars()
                .all(|character| character.is_ascii_alphanumeric() || matches!(character, '.' | '_' | '-')),
        InvalidKeySnafu {
            stage: "validate-storage-key",
            key: key.to_string(),
        }
    );
    Ok(())
}

/// Stores every key as `<root>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    root: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }

        let value = std::fs::read_to_string(&path).context(ReadFileSnafu {
            stage: "read-storage-file",
            path: path.clone(),
        })?;
        Ok(Some(value))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.root).context(CreateDirSnafu {
            stage: "create-storage-directory",
            path: self.root.clone(),
        })?;

        // Readers only ever see the old or the new value.
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, value).context(WriteFileSnafu {
            stage: "write-temporary-storage-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &path).context(RenameTempFileSnafu {
            stage: "rename-temporary-storage-file",
            from: temp_path,
            to: path.clone(),
        })?;

        tracing::debug!(key, path = ?path, bytes = value.len(), "stored value");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        validate_key(key)?;
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }
}
