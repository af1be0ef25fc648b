use std::sync::Arc;

mod client;
mod loading;
mod model;
mod poller;
mod provider;
mod rest;
mod rig_adapter;
mod schema;
#[cfg(test)]
mod testing;

pub use client::{GenerationClient, GenerationError, GenerationResult, IMAGE_OUTPUT_MIME_TYPE, ImageOptions};
pub use loading::{LoadingGuard, LoadingSnapshot, LoadingState, global_loading_state};
pub use model::{
    DEFAULT_IMAGE_MODEL, DEFAULT_TEXT_MODEL, DEFAULT_VIDEO_MODEL, Modality, Model, ModelSet,
    default_gemini_models,
};
pub use poller::{
    DEFAULT_MAX_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL, OperationPoller, PollError, PollPolicy,
    PollResult,
};
pub use provider::{
    AspectRatio, BoxFuture, ContentRequest, DEFAULT_GEMINI_ENDPOINT, GenAiProvider,
    GeneratedImage, GeneratedVideo, ImageRequest, InputImage, Operation, ProviderConfig,
    ProviderError, ProviderResult, ResponseFormat, VideoRequest, VideoResponse,
    authorized_download_url,
};
pub use rest::DEFAULT_REQUEST_TIMEOUT;
pub use rig_adapter::{RIG_GEMINI_PROVIDER_ID, RigGeminiAdapter};
pub use schema::{DecodeError, DecodeResult, Field, Schema, SchemaKind};

pub fn create_provider(mut config: ProviderConfig) -> ProviderResult<Arc<dyn GenAiProvider>> {
    if config.provider_id.trim().is_empty() {
        config.provider_id = RIG_GEMINI_PROVIDER_ID.to_string();
    }

    match config.provider_id.as_str() {
        "gemini" | "rig-gemini" => {
            config.provider_id = RIG_GEMINI_PROVIDER_ID.to_string();
            Ok(Arc::new(RigGeminiAdapter::new(config)?))
        }
        _ => Err(ProviderError::UnsupportedProvider {
            stage: "create-provider",
            provider_id: config.provider_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_provider_id_defaults_to_gemini() {
        let provider = create_provider(ProviderConfig::new("", "key", "")).expect("provider");
        assert_eq!(provider.id(), RIG_GEMINI_PROVIDER_ID);
    }

    #[test]
    fn rig_alias_is_accepted() {
        let provider =
            create_provider(ProviderConfig::new("rig-gemini", "key", "")).expect("provider");
        assert_eq!(provider.id(), "gemini");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let result = create_provider(ProviderConfig::new("openai", "key", ""));
        assert!(matches!(
            result,
            Err(ProviderError::UnsupportedProvider { ref provider_id, .. }) if provider_id == "openai"
        ));
    }
}
