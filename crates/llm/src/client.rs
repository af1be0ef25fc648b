use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::de::DeserializeOwned;
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use tokio_util::sync::CancellationToken;

use super::loading::{LoadingGuard, LoadingState, global_loading_state};
use super::model::{Modality, ModelSet};
use super::poller::{OperationPoller, PollError, PollPolicy};
use super::provider::{
    AspectRatio, ContentRequest, GenAiProvider, ImageRequest, InputImage, ProviderError,
    ResponseFormat, VideoRequest,
};
use super::schema::{DecodeError, Schema};

pub const IMAGE_OUTPUT_MIME_TYPE: &str = "image/jpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageOptions {
    pub aspect_ratio: AspectRatio,
    pub count: u32,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            aspect_ratio: AspectRatio::Square,
            count: 1,
        }
    }
}

impl ImageOptions {
    pub fn with_aspect_ratio(aspect_ratio: AspectRatio) -> Self {
        Self {
            aspect_ratio,
            ..Self::default()
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum GenerationError {
    #[snafu(display("{field} must not be empty"))]
    InvalidInput {
        stage: &'static str,
        field: &'static str,
    },
    #[snafu(display("{source}"))]
    Provider {
        stage: &'static str,
        modality: Modality,
        source: ProviderError,
    },
    #[snafu(display("{source}"))]
    Parse {
        stage: &'static str,
        source: DecodeError,
    },
    #[snafu(display("{source}"))]
    Poll {
        stage: &'static str,
        source: PollError,
    },
    #[snafu(display("provider returned no images"))]
    EmptyImageSet { stage: &'static str },
}

impl GenerationError {
    /// Everything except input validation goes through the failure path:
    /// recorded in the loading state and logged.
    pub fn is_provider_failure(&self) -> bool {
        !matches!(self, Self::InvalidInput { .. })
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}

pub type GenerationResult<T> = Result<T, GenerationError>;

/// Issues provider requests for the four modalities and keeps the shared
/// loading state in step with every call.
#[derive(Clone)]
pub struct GenerationClient {
    provider: Arc<dyn GenAiProvider>,
    loading: LoadingState,
    models: ModelSet,
    poll_policy: PollPolicy,
}

impl GenerationClient {
    pub fn new(provider: Arc<dyn GenAiProvider>) -> Self {
        Self {
            provider,
            loading: global_loading_state(),
            models: ModelSet::default(),
            poll_policy: PollPolicy::default(),
        }
    }

    pub fn with_loading_state(mut self, loading: LoadingState) -> Self {
        self.loading = loading;
        self
    }

    pub fn with_models(mut self, models: ModelSet) -> Self {
        self.models = models.normalized();
        self
    }

    pub fn with_poll_policy(mut self, poll_policy: PollPolicy) -> Self {
        self.poll_policy = poll_policy;
        self
    }

    pub fn loading(&self) -> &LoadingState {
        &self.loading
    }

    pub fn models(&self) -> &ModelSet {
        &self.models
    }

    pub async fn generate_text(&self, prompt: &str) -> GenerationResult<String> {
        ensure_prompt(prompt, "generate-text")?;
        let guard = self.loading.begin();
        let outcome = self
            .provider
            .generate_content(ContentRequest {
                model_id: self.models.for_modality(Modality::Text).to_string(),
                prompt: prompt.to_string(),
                format: ResponseFormat::Text,
            })
            .await
            .context(ProviderSnafu {
                stage: "generate-text",
                modality: Modality::Text,
            });
        self.settle(guard, Modality::Text, outcome)
    }

    pub async fn generate_structured<T: DeserializeOwned>(
        &self,
        prompt: &str,
        schema: &Schema,
    ) -> GenerationResult<T> {
        ensure_prompt(prompt, "generate-structured")?;
        let guard = self.loading.begin();
        let outcome = self.request_structured(prompt, schema).await;
        self.settle(guard, Modality::Structured, outcome)
    }

    async fn request_structured<T: DeserializeOwned>(
        &self,
        prompt: &str,
        schema: &Schema,
    ) -> GenerationResult<T> {
        let body = self
            .provider
            .generate_content(ContentRequest {
                model_id: self.models.for_modality(Modality::Structured).to_string(),
                prompt: prompt.to_string(),
                format: ResponseFormat::Json {
                    schema: schema.to_provider_json(),
                },
            })
            .await
            .context(ProviderSnafu {
                stage: "generate-structured",
                modality: Modality::Structured,
            })?;

        schema.decode(&body).context(ParseSnafu {
            stage: "generate-structured-decode",
        })
    }

    /// Returns the first generated image as a `data:` URI.
    pub async fn generate_image(&self, prompt: &str, options: ImageOptions) -> GenerationResult<String> {
        ensure_prompt(prompt, "generate-image")?;
        let guard = self.loading.begin();
        let outcome = self.request_image(prompt, options).await;
        self.settle(guard, Modality::Image, outcome)
    }

    async fn request_image(&self, prompt: &str, options: ImageOptions) -> GenerationResult<String> {
        let images = self
            .provider
            .generate_images(ImageRequest {
                model_id: self.models.for_modality(Modality::Image).to_string(),
                prompt: prompt.to_string(),
                count: options.count.max(1),
                aspect_ratio: options.aspect_ratio,
                output_mime_type: IMAGE_OUTPUT_MIME_TYPE.to_string(),
            })
            .await
            .context(ProviderSnafu {
                stage: "generate-image",
                modality: Modality::Image,
            })?;

        let first = images.into_iter().next().context(EmptyImageSetSnafu {
            stage: "generate-image-first",
        })?;

        Ok(format!(
            "data:{};base64,{}",
            first.mime_type,
            BASE64_STANDARD.encode(&first.bytes)
        ))
    }

    /// Runs a video job to completion. `None` means the job finished without
    /// producing a usable reference, which is not a failure.
    pub async fn generate_video(
        &self,
        prompt: &str,
        image: Option<InputImage>,
    ) -> GenerationResult<Option<String>> {
        self.generate_video_with_cancel(prompt, image, CancellationToken::new())
            .await
    }

    pub async fn generate_video_with_cancel(
        &self,
        prompt: &str,
        image: Option<InputImage>,
        cancel: CancellationToken,
    ) -> GenerationResult<Option<String>> {
        ensure_prompt(prompt, "generate-video")?;
        let guard = self.loading.begin();
        let outcome = self.request_video(prompt, image, cancel).await;
        self.settle(guard, Modality::Video, outcome)
    }

    async fn request_video(
        &self,
        prompt: &str,
        image: Option<InputImage>,
        cancel: CancellationToken,
    ) -> GenerationResult<Option<String>> {
        let initial = self
            .provider
            .generate_videos(VideoRequest {
                model_id: self.models.for_modality(Modality::Video).to_string(),
                prompt: prompt.to_string(),
                count: 1,
                image,
            })
            .await
            .context(ProviderSnafu {
                stage: "generate-video-start",
                modality: Modality::Video,
            })?;

        tracing::info!(
            operation = %initial.name,
            done = initial.done,
            "video job started"
        );

        let finished = OperationPoller::new(self.provider.as_ref(), self.poll_policy)
            .with_cancellation(cancel)
            .run(initial)
            .await
            .context(PollSnafu {
                stage: "generate-video-poll",
            })?;

        let uri = finished.result_uri().map(str::to_string);
        if uri.is_none() {
            tracing::warn!(
                operation = %finished.name,
                "video job finished without a result reference"
            );
        }
        Ok(uri)
    }

    fn settle<T>(
        &self,
        guard: LoadingGuard,
        modality: Modality,
        outcome: GenerationResult<T>,
    ) -> GenerationResult<T> {
        match outcome {
            Ok(value) => {
                drop(guard);
                Ok(value)
            }
            Err(error) => {
                let message = error.to_string();
                let message = if message.trim().is_empty() {
                    modality.default_failure_message().to_string()
                } else {
                    message
                };
                tracing::error!(
                    provider_id = %self.provider.id(),
                    modality = %modality,
                    error = %message,
                    "generation failed"
                );
                guard.fail(message);
                Err(error)
            }
        }
    }
}

fn ensure_prompt(prompt: &str, stage: &'static str) -> GenerationResult<()> {
    ensure!(
        !prompt.trim().is_empty(),
        InvalidInputSnafu {
            stage,
            field: "prompt",
        }
    );
    Ok(())
}
