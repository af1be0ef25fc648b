use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use snafu::ResultExt;

use super::error::{SerializeSnafu, StorageResult};
use super::ids::HistoryItemId;
use super::kv::KeyValueStore;
use super::types::{HISTORY_CORRUPT_KEY, HISTORY_KEY, HistoryItem, NewHistoryItem};

/// Append-only record of completed creations, newest first.
///
/// The whole sequence is rewritten to the backing store after every append.
pub struct HistoryStore {
    backend: Arc<dyn KeyValueStore>,
    items: Mutex<Vec<HistoryItem>>,
}

impl HistoryStore {
    pub fn load(backend: Arc<dyn KeyValueStore>) -> StorageResult<Self> {
        let items = match backend.get(HISTORY_KEY)? {
            None => Vec::new(),
            Some(raw) => match serde_json::from_str::<Vec<HistoryItem>>(&raw) {
                Ok(items) => items,
                Err(error) => {
                    tracing::warn!(
                        key = HISTORY_KEY,
                        error = %error,
                        "persisted history is unreadable, starting empty"
                    );
                    preserve_unreadable(backend.as_ref(), &raw);
                    Vec::new()
                }
            },
        };

        tracing::debug!(count = items.len(), "loaded history");
        Ok(Self {
            backend,
            items: Mutex::new(items),
        })
    }

    pub fn add_item(&self, input: NewHistoryItem) -> StorageResult<HistoryItem> {
        let mut items = self.items();

        // Timestamps never go backwards even if the wall clock does.
        let newest = items.first().map_or(i64::MIN, |item| item.timestamp);
        let item = HistoryItem {
            id: HistoryItemId::new_v7(),
            kind: input.kind,
            timestamp: current_unix_timestamp_millis().max(newest),
            input: input.input,
            output: input.output,
            title: input.title,
        };

        items.insert(0, item.clone());
        if let Err(error) = self.persist(&items) {
            items.remove(0);
            tracing::error!(
                kind = %item.kind,
                error = %error,
                "failed to persist history, append rolled back"
            );
            return Err(error);
        }

        tracing::info!(id = %item.id, kind = %item.kind, count = items.len(), "recorded history item");
        Ok(item)
    }

    pub fn list(&self) -> Vec<HistoryItem> {
        self.items().clone()
    }

    pub fn get(&self, id: HistoryItemId) -> Option<HistoryItem> {
        self.items().iter().find(|item| item.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    fn persist(&self, items: &[HistoryItem]) -> StorageResult<()> {
        let payload = serde_json::to_string(items).context(SerializeSnafu {
            stage: "serialize-history",
            key: HISTORY_KEY,
        })?;
        self.backend.set(HISTORY_KEY, &payload)
    }

    fn items(&self) -> MutexGuard<'_, Vec<HistoryItem>> {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Keeps the payload so the next append does not destroy it. An earlier
/// backup is never overwritten.
fn preserve_unreadable(backend: &dyn KeyValueStore, raw: &str) {
    match backend.get(HISTORY_CORRUPT_KEY) {
        Ok(Some(_)) => {
            tracing::debug!(key = HISTORY_CORRUPT_KEY, "unreadable history already preserved");
            return;
        }
        Ok(None) => {}
        Err(error) => {
            tracing::warn!(
                key = HISTORY_CORRUPT_KEY,
                error = %error,
                "failed to check for an existing history backup"
            );
            return;
        }
    }

    if let Err(error) = backend.set(HISTORY_CORRUPT_KEY, raw) {
        tracing::warn!(
            key = HISTORY_CORRUPT_KEY,
            error = %error,
            "failed to preserve unreadable history"
        );
    }
}

fn current_unix_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| i64::try_from(duration.as_millis()).unwrap_or(i64::MAX))
}
