//! Direct REST calls for what the completion client cannot express: schema
//! constrained `generateContent`, images (`:predict`) and video jobs
//! (`:predictLongRunning`).

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use super::provider::{
    ApiStatusSnafu, DecodeImageSnafu, EmptyResponseSnafu, GeneratedImage, GeneratedVideo,
    ImageRequest, JobFailedSnafu, Operation, PayloadSnafu, ProviderResult, TransportSnafu,
    VideoRequest, VideoResponse,
};

const API_KEY_HEADER: &str = "x-goog-api-key";
const JSON_MIME_TYPE: &str = "application/json";

/// Upper bound for a single HTTP exchange, so a stalled connection cannot hang a caller.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl RestClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .context(TransportSnafu {
                stage: "rest-client-build",
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }

    /// `generateContent` constrained to `schema`, sent as-is so every keyword
    /// (including `propertyOrdering`) reaches the provider.
    pub async fn generate_structured(
        &self,
        model_id: &str,
        prompt: &str,
        schema: &serde_json::Value,
    ) -> ProviderResult<String> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, model_id);
        let body = structured_content_body(prompt, schema);

        let payload: GenerateContentResponse =
            self.post_json(&url, &body, "structured-generate").await?;
        payload.into_text(model_id)
    }

    pub async fn generate_images(&self, request: &ImageRequest) -> ProviderResult<Vec<GeneratedImage>> {
        let url = format!("{}/models/{}:predict", self.endpoint, request.model_id);
        let body = PredictRequest {
            instances: vec![ImageInstance {
                prompt: &request.prompt,
            }],
            parameters: ImageParameters {
                sample_count: request.count,
                aspect_ratio: request.aspect_ratio.as_str(),
                output_options: OutputOptions {
                    mime_type: &request.output_mime_type,
                },
            },
        };

        let payload: PredictImagesResponse = self.post_json(&url, &body, "image-predict").await?;
        let mut images = Vec::with_capacity(payload.predictions.len());
        for prediction in payload.predictions {
            let Some(encoded) = prediction.bytes_base64_encoded else {
                // Filtered predictions carry a reason instead of bytes.
                tracing::warn!(
                    model_id = %request.model_id,
                    reason = prediction.rai_filtered_reason.as_deref().unwrap_or("unspecified"),
                    "skipping image prediction without bytes"
                );
                continue;
            };
            let bytes = BASE64_STANDARD
                .decode(encoded.as_bytes())
                .context(DecodeImageSnafu {
                    stage: "image-decode-bytes",
                })?;
            images.push(GeneratedImage {
                bytes,
                mime_type: prediction
                    .mime_type
                    .unwrap_or_else(|| request.output_mime_type.clone()),
            });
        }

        Ok(images)
    }

    pub async fn start_video(&self, request: &VideoRequest) -> ProviderResult<Operation> {
        let url = format!(
            "{}/models/{}:predictLongRunning",
            self.endpoint, request.model_id
        );
        let body = PredictRequest {
            instances: vec![VideoInstance {
                prompt: &request.prompt,
                image: request.image.as_ref().map(|image| EncodedImage {
                    bytes_base64_encoded: BASE64_STANDARD.encode(&image.bytes),
                    mime_type: image.mime_type.clone(),
                }),
            }],
            parameters: VideoParameters {
                sample_count: request.count,
            },
        };

        let payload: OperationPayload = self.post_json(&url, &body, "video-start").await?;
        payload.into_operation("video-start")
    }

    pub async fn refresh_operation(&self, operation: &Operation) -> ProviderResult<Operation> {
        let url = format!("{}/{}", self.endpoint, operation.name);
        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .context(TransportSnafu {
                stage: "operation-refresh-send",
            })?;

        let payload: OperationPayload = read_json(response, "operation-refresh").await?;
        payload.into_operation("operation-refresh")
    }

    async fn post_json<B, T>(&self, url: &str, body: &B, stage: &'static str) -> ProviderResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .context(TransportSnafu { stage })?;

        read_json(response, stage).await
    }
}

async fn read_json<T: DeserializeOwned>(response: Response, stage: &'static str) -> ProviderResult<T> {
    let status = response.status();
    let text = response.text().await.context(TransportSnafu { stage })?;

    if !status.is_success() {
        return ApiStatusSnafu {
            stage,
            status: status.as_u16(),
            message: api_error_message(&text)
                .unwrap_or_else(|| format!("provider returned status {status}")),
        }
        .fail();
    }

    serde_json::from_str(&text).context(PayloadSnafu { stage })
}

/// Pulls `error.message` out of a provider error body.
fn api_error_message(body: &str) -> Option<String> {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok()?;
    let message = envelope.error.message?;
    let message = message.trim();
    (!message.is_empty()).then(|| message.to_string())
}

fn structured_content_body<'a>(
    prompt: &'a str,
    schema: &'a serde_json::Value,
) -> GenerateContentRequest<'a> {
    GenerateContentRequest {
        contents: vec![ContentPayload {
            role: "user",
            parts: vec![TextPart { text: prompt }],
        }],
        generation_config: GenerationConfigPayload {
            response_mime_type: JSON_MIME_TYPE,
            response_schema: schema,
        },
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<ContentPayload<'a>>,
    generation_config: GenerationConfigPayload<'a>,
}

#[derive(Serialize)]
struct ContentPayload<'a> {
    role: &'a str,
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfigPayload<'a> {
    response_mime_type: &'a str,
    response_schema: &'a serde_json::Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<CandidatePayload>,
    prompt_feedback: Option<PromptFeedbackPayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandidatePayload {
    content: Option<CandidateContentPayload>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContentPayload {
    #[serde(default)]
    parts: Vec<ResponsePartPayload>,
}

#[derive(Deserialize)]
struct ResponsePartPayload {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedbackPayload {
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self, model_id: &str) -> ProviderResult<String> {
        let block_reason = self
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason);
        let Some(candidate) = self.candidates.into_iter().next() else {
            return EmptyResponseSnafu {
                stage: "structured-generate-text",
                details: match block_reason {
                    Some(reason) => format!("prompt blocked: {reason}"),
                    None => "response has no candidates".to_string(),
                },
            }
            .fail();
        };

        // A single answer may be split across several text parts.
        let text = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            tracing::warn!(
                model_id,
                finish_reason = candidate.finish_reason.as_deref().unwrap_or("unspecified"),
                "structured response contained no text"
            );
            return EmptyResponseSnafu {
                stage: "structured-generate-text",
                details: format!(
                    "candidate has no text (finish reason: {})",
                    candidate.finish_reason.as_deref().unwrap_or("unspecified")
                ),
            }
            .fail();
        }

        Ok(text)
    }
}

#[derive(Serialize)]
struct PredictRequest<I, P> {
    instances: Vec<I>,
    parameters: P,
}

#[derive(Serialize)]
struct ImageInstance<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageParameters<'a> {
    sample_count: u32,
    aspect_ratio: &'a str,
    output_options: OutputOptions<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutputOptions<'a> {
    mime_type: &'a str,
}

#[derive(Serialize)]
struct VideoInstance<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<EncodedImage>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EncodedImage {
    bytes_base64_encoded: String,
    mime_type: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoParameters {
    sample_count: u32,
}

#[derive(Deserialize)]
struct PredictImagesResponse {
    #[serde(default)]
    predictions: Vec<ImagePrediction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImagePrediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
    rai_filtered_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationPayload {
    #[serde(default)]
    name: String,
    #[serde(default)]
    done: bool,
    response: Option<OperationResponsePayload>,
    error: Option<OperationErrorPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponsePayload {
    generate_video_response: Option<GenerateVideoResponsePayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponsePayload {
    #[serde(default)]
    generated_samples: Vec<GeneratedSamplePayload>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSamplePayload {
    video: Option<VideoFilePayload>,
}

#[derive(Debug, Deserialize)]
struct VideoFilePayload {
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationErrorPayload {
    code: Option<i64>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl OperationPayload {
    fn into_operation(self, stage: &'static str) -> ProviderResult<Operation> {
        if self.name.trim().is_empty() {
            return EmptyResponseSnafu {
                stage,
                details: "operation payload has no name".to_string(),
            }
            .fail();
        }

        if let Some(error) = self.error {
            return JobFailedSnafu {
                stage,
                operation: self.name,
                code: error.code,
                message: error
                    .message
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| "video generation job failed".to_string()),
            }
            .fail();
        }

        let response = self
            .response
            .and_then(|response| response.generate_video_response)
            .map(|response| VideoResponse {
                generated_videos: response
                    .generated_samples
                    .into_iter()
                    .map(|sample| GeneratedVideo {
                        uri: sample.video.and_then(|video| video.uri),
                    })
                    .collect(),
            });

        Ok(Operation {
            name: self.name,
            done: self.done,
            response,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::provider::ProviderError;
    use crate::schema::{Field, Schema};

    fn parse(body: &str) -> ProviderResult<Operation> {
        serde_json::from_str::<OperationPayload>(body)
            .expect("fixture is valid JSON")
            .into_operation("test")
    }

    #[test]
    fn pending_operation_has_no_response() {
        let operation = parse(r#"{"name":"models/veo/operations/abc"}"#).expect("pending op");
        assert_eq!(operation, Operation::pending("models/veo/operations/abc"));
    }

    #[test]
    fn finished_operation_exposes_the_nested_video_uri() {
        let operation = parse(
            r#"{
                "name": "models/veo/operations/abc",
                "done": true,
                "response": {
                    "@type": "type.googleapis.com/google.ai.generativelanguage.v1beta.PredictLongRunningResponse",
                    "generateVideoResponse": {
                        "generatedSamples": [
                            { "video": { "uri": "https://files.example/v1/abc:download?alt=media" } }
                        ]
                    }
                }
            }"#,
        )
        .expect("finished op");

        assert!(operation.done);
        assert_eq!(
            operation.result_uri(),
            Some("https://files.example/v1/abc:download?alt=media")
        );
    }

    #[test]
    fn finished_operation_without_samples_has_no_uri() {
        let operation = parse(
            r#"{"name":"ops/1","done":true,"response":{"generateVideoResponse":{}}}"#,
        )
        .expect("finished op");
        assert!(operation.done);
        assert_eq!(operation.result_uri(), None);
    }

    #[test]
    fn operation_error_becomes_a_job_failure() {
        let error = parse(
            r#"{"name":"ops/2","done":true,"error":{"code":3,"message":"prompt was blocked"}}"#,
        )
        .expect_err("job failure");

        match error {
            ProviderError::JobFailed {
                operation,
                code,
                message,
                ..
            } => {
                assert_eq!(operation, "ops/2");
                assert_eq!(code, Some(3));
                assert_eq!(message, "prompt was blocked");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn api_error_message_is_taken_verbatim() {
        let body = r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            api_error_message(body).as_deref(),
            Some("Resource has been exhausted")
        );
        assert_eq!(api_error_message("<html>bad gateway</html>"), None);
    }

    #[test]
    fn video_request_body_embeds_the_conditioning_image() {
        let body = PredictRequest {
            instances: vec![VideoInstance {
                prompt: "a cat surfing",
                image: Some(EncodedImage {
                    bytes_base64_encoded: BASE64_STANDARD.encode(b"png"),
                    mime_type: "image/png".to_string(),
                }),
            }],
            parameters: VideoParameters { sample_count: 1 },
        };

        let encoded = serde_json::to_value(&body).expect("serializable");
        assert_eq!(encoded["instances"][0]["image"]["bytesBase64Encoded"], "cG5n");
        assert_eq!(encoded["instances"][0]["image"]["mimeType"], "image/png");
        assert_eq!(encoded["parameters"]["sampleCount"], 1);
    }

    #[test]
    fn structured_body_keeps_the_schema_untouched() {
        let schema = Schema::object(vec![
            Field::required("title", Schema::string()),
            Field::required("sections", Schema::array(Schema::string())),
            Field::optional("niche", Schema::string()),
        ])
        .to_provider_json();

        let encoded =
            serde_json::to_value(structured_content_body("a garden site", &schema)).expect("serializable");

        assert_eq!(encoded["contents"][0]["role"], "user");
        assert_eq!(encoded["contents"][0]["parts"][0]["text"], "a garden site");
        assert_eq!(
            encoded["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(encoded["generationConfig"]["responseSchema"], schema);
        assert_eq!(
            encoded["generationConfig"]["responseSchema"]["propertyOrdering"],
            json!(["title", "sections", "niche"])
        );
    }

    #[test]
    fn structured_response_joins_text_parts() {
        let payload: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"title\":"},{"text":"\"x\"}"}]},"finishReason":"STOP"}]}"#,
        )
        .expect("fixture is valid JSON");

        assert_eq!(payload.into_text("m").expect("text"), r#"{"title":"x"}"#);
    }

    #[test]
    fn blocked_prompt_is_an_empty_response() {
        let payload: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#)
                .expect("fixture is valid JSON");

        match payload.into_text("m") {
            Err(ProviderError::EmptyResponse { details, .. }) => {
                assert_eq!(details, "prompt blocked: SAFETY");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn client_builds_with_a_request_timeout() {
        let client = RestClient::new("https://proxy.example/v1beta", "key").expect("client");
        assert_eq!(client.endpoint, "https://proxy.example/v1beta");
    }
}
