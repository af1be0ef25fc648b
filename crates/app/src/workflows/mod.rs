//! Creator workflows: each one validates its input, drives the generation
//! client, and records the finished creation in history.

use std::sync::Arc;

use atelier_llm::{GenerationClient, GenerationError};
use atelier_storage::{HistoryItemId, HistoryStore, NewHistoryItem};
use snafu::{Snafu, ensure};
use tokio_util::sync::CancellationToken;

mod app_blueprint;
#[cfg(test)]
mod testing;
mod video;
mod website;

pub use app_blueprint::{AppBlueprint, AppBlueprintRequest, AppCreation, AppFeature, app_blueprint_schema};
pub use video::{
    CharacterVideo, CharacterVideoRequest, ImageToVideoRequest, VideoOutcome, ViralVideoRequest,
};
pub use website::{
    SectionImage, WebsiteBlueprint, WebsiteCreation, WebsiteRequest, WebsiteSection,
    website_schema,
};

const TITLE_PREVIEW_CHARS: usize = 30;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum WorkflowError {
    #[snafu(display("{field} must not be empty"))]
    MissingInput {
        stage: &'static str,
        field: &'static str,
    },
    #[snafu(display("{source}"))]
    Generation {
        stage: &'static str,
        source: GenerationError,
    },
}

impl WorkflowError {
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::MissingInput { .. }
                | Self::Generation {
                    source: GenerationError::InvalidInput { .. },
                    ..
                }
        )
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Entry point for the creator features.
#[derive(Clone)]
pub struct Creator {
    client: GenerationClient,
    history: Arc<HistoryStore>,
    cancel: CancellationToken,
}

impl Creator {
    pub fn new(client: GenerationClient, history: Arc<HistoryStore>) -> Self {
        Self {
            client,
            history,
            cancel: CancellationToken::new(),
        }
    }

    /// Video workflows stop polling once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn client(&self) -> &GenerationClient {
        &self.client
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// A failed write never discards the generated content, it only leaves
    /// the creation without a history id.
    fn record(&self, item: NewHistoryItem) -> Option<HistoryItemId> {
        let kind = item.kind;
        match self.history.add_item(item) {
            Ok(recorded) => Some(recorded.id),
            Err(error) => {
                tracing::error!(kind = %kind, error = %error, "failed to record creation in history");
                None
            }
        }
    }
}

fn require(value: &str, field: &'static str, stage: &'static str) -> WorkflowResult<()> {
    ensure!(!value.trim().is_empty(), MissingInputSnafu { stage, field });
    Ok(())
}

/// First characters of `text` followed by an ellipsis, as used in titles.
fn preview(text: &str) -> String {
    let head = text.trim().chars().take(TITLE_PREVIEW_CHARS).collect::<String>();
    format!("{head}...")
}
