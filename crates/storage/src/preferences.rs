use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use super::error::{SerializeSnafu, StorageResult};
use super::kv::KeyValueStore;
use super::types::LANGUAGE_KEY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Pt,
    En,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pt => "pt",
            Self::En => "en",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pt" => Some(Self::Pt),
            "en" => Some(Self::En),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

pub struct PreferenceStore {
    backend: Arc<dyn KeyValueStore>,
}

impl PreferenceStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Missing or unrecognised values fall back to the default language.
    pub fn language(&self) -> StorageResult<Language> {
        let Some(raw) = self.backend.get(LANGUAGE_KEY)? else {
            return Ok(Language::default());
        };

        // Older payloads stored the bare code rather than a JSON string.
        let code = serde_json::from_str::<String>(&raw).unwrap_or(raw);
        match Language::parse(&code) {
            Some(language) => Ok(language),
            None => {
                tracing::warn!(key = LANGUAGE_KEY, value = %code, "unknown language preference");
                Ok(Language::default())
            }
        }
    }

    pub fn set_language(&self, language: Language) -> StorageResult<()> {
        let payload = serde_json::to_string(&language).context(SerializeSnafu {
            stage: "serialize-language",
            key: LANGUAGE_KEY,
        })?;
        self.backend.set(LANGUAGE_KEY, &payload)?;
        tracing::info!(language = %language, "saved language preference");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKeyValueStore;

    #[test]
    fn defaults_to_portuguese() {
        let store = PreferenceStore::new(Arc::new(MemoryKeyValueStore::new()));
        assert_eq!(store.language().expect("language"), Language::Pt);
    }

    #[test]
    fn language_round_trips() {
        let backend = Arc::new(MemoryKeyValueStore::new());
        let store = PreferenceStore::new(backend.clone());

        store.set_language(Language::En).expect("set");
        assert_eq!(store.language().expect("language"), Language::En);
        assert_eq!(backend.get(LANGUAGE_KEY).expect("get").as_deref(), Some("\"en\""));
    }

    #[test]
    fn bare_and_unknown_codes_are_tolerated() {
        let backend = Arc::new(MemoryKeyValueStore::new());
        let store = PreferenceStore::new(backend.clone());

        backend.set(LANGUAGE_KEY, "en").expect("seed");
        assert_eq!(store.language().expect("language"), Language::En);

        backend.set(LANGUAGE_KEY, "\"fr\"").expect("seed");
        assert_eq!(store.language().expect("language"), Language::Pt);
    }
}
