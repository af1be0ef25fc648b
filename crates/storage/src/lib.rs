pub mod error;
pub mod history;
pub mod ids;
pub mod kv;
pub mod preferences;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use history::HistoryStore;
pub use ids::HistoryItemId;
pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, validate_key};
pub use preferences::{Language, PreferenceStore};
pub use types::{
    CreationKind, HISTORY_CORRUPT_KEY, HISTORY_KEY, HistoryItem, LANGUAGE_KEY, NewHistoryItem,
};
