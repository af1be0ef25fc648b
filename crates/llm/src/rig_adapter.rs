use rig::completion::{AssistantContent, CompletionModel};
use rig::prelude::CompletionClient;
use rig::providers::gemini;
use snafu::{ResultExt, ensure};

use super::provider::{
    BoxFuture, CompletionsFailedSnafu, ContentRequest, EmptyResponseSnafu, GenAiProvider,
    GeneratedImage, HttpClientSnafu, ImageRequest, MissingApiKeySnafu, Operation,
    ProviderConfig, ProviderResult, ResponseFormat, VideoRequest,
};
use super::rest::RestClient;

pub const RIG_GEMINI_PROVIDER_ID: &str = "gemini";

/// Gemini provider: free text goes through rig's completion model. Schema
/// constrained content, images and videos go through the REST endpoints,
/// since rig's generation config would drop `propertyOrdering`.
pub struct RigGeminiAdapter {
    config: ProviderConfig,
    rest: RestClient,
}

impl RigGeminiAdapter {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "rig-adapter-new",
                provider_id: config.provider_id.clone(),
            }
        );

        let rest = RestClient::new(config.endpoint_or_default(), config.api_key.clone())?;
        Ok(Self { config, rest })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn build_client(config: &ProviderConfig) -> ProviderResult<gemini::Client> {
        let mut builder = gemini::Client::builder().api_key(config.api_key.as_str());
        if !config.endpoint.is_empty() {
            builder = builder.base_url(Self::completion_base_url(&config.endpoint));
        }
        builder.build().context(HttpClientSnafu {
            stage: "build-client",
        })
    }

    // rig appends the API version itself, the REST endpoints expect it in the base.
    fn completion_base_url(endpoint: &str) -> &str {
        endpoint.strip_suffix("/v1beta").unwrap_or(endpoint)
    }

    async fn complete(config: &ProviderConfig, request: ContentRequest) -> ProviderResult<String> {
        let client = Self::build_client(config)?;
        let model = client.completion_model(request.model_id.clone());

        let response = model
            .completion_request(request.prompt)
            .send()
            .await
            .context(CompletionsFailedSnafu {
                stage: "generate-content",
            })?;

        // Gemini may split a single answer across several text parts.
        let text = response
            .choice
            .iter()
            .filter_map(|content| match content {
                AssistantContent::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect::<String>();

        if text.trim().is_empty() {
            tracing::warn!(
                model_id = %request.model_id,
                "provider returned a completion without text parts"
            );
            return EmptyResponseSnafu {
                stage: "generate-content-text",
                details: "completion contained no text".to_string(),
            }
            .fail();
        }

        Ok(text)
    }
}

impl GenAiProvider for RigGeminiAdapter {
    fn id(&self) -> &str {
        &self.config.provider_id
    }

    fn generate_content<'a>(&'a self, request: ContentRequest) -> BoxFuture<'a, ProviderResult<String>> {
        Box::pin(async move {
            tracing::debug!(
                model_id = %request.model_id,
                structured = matches!(request.format, ResponseFormat::Json { .. }),
                "sending content request"
            );
            if let ResponseFormat::Json { schema } = &request.format {
                return self
                    .rest
                    .generate_structured(&request.model_id, &request.prompt, schema)
                    .await;
            }
            Self::complete(&self.config, request).await
        })
    }

    fn generate_images<'a>(
        &'a self,
        request: ImageRequest,
    ) -> BoxFuture<'a, ProviderResult<Vec<GeneratedImage>>> {
        Box::pin(async move {
            tracing::debug!(
                model_id = %request.model_id,
                count = request.count,
                aspect_ratio = request.aspect_ratio.as_str(),
                "sending image request"
            );
            self.rest.generate_images(&request).await
        })
    }

    fn generate_videos<'a>(&'a self, request: VideoRequest) -> BoxFuture<'a, ProviderResult<Operation>> {
        Box::pin(async move {
            tracing::debug!(
                model_id = %request.model_id,
                conditioned = request.image.is_some(),
                "starting video job"
            );
            self.rest.start_video(&request).await
        })
    }

    fn refresh_operation<'a>(
        &'a self,
        operation: &'a Operation,
    ) -> BoxFuture<'a, ProviderResult<Operation>> {
        Box::pin(self.rest.refresh_operation(operation))
    }
}
