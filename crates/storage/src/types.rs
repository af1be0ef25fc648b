use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ids::HistoryItemId;

pub const HISTORY_KEY: &str = "hg-tec-history";
pub const HISTORY_CORRUPT_KEY: &str = "hg-tec-history.corrupt";
pub const LANGUAGE_KEY: &str = "hg-tec-lang";

/// Which creator feature produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CreationKind {
    VideoCreation,
    ImageToVideo,
    WebsiteCreator,
    AppCreator,
    ViralVideo,
}

impl CreationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VideoCreation => "video-creation",
            Self::ImageToVideo => "image-to-video",
            Self::WebsiteCreator => "website-creator",
            Self::AppCreator => "app-creator",
            Self::ViralVideo => "viral-video",
        }
    }
}

impl fmt::Display for CreationKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: HistoryItemId,
    #[serde(rename = "type")]
    pub kind: CreationKind,
    /// Unix milliseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub input: Map<String, Value>,
    #[serde(default)]
    pub output: Map<String, Value>,
    pub title: String,
}

/// Caller-supplied part of a history entry; id and timestamp are assigned on append.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryItem {
    pub kind: CreationKind,
    pub input: Map<String, Value>,
    pub output: Map<String, Value>,
    pub title: String,
}

impl NewHistoryItem {
    pub fn new(kind: CreationKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            input: Map::new(),
            output: Map::new(),
            title: title.into(),
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.input.insert(key.into(), value.into());
        self
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.output.insert(key.into(), value.into());
        self
    }
}
