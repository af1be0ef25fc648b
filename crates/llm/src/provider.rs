use std::future::Future;
use std::pin::Pin;

use snafu::Snafu;

use super::model::ModelSet;

pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub provider_id: String,
    pub api_key: String,
    pub endpoint: String,
    pub models: ModelSet,
}

impl ProviderConfig {
    pub fn new(
        provider_id: impl Into<String>,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into().trim().to_string(),
            api_key: api_key.into().trim().to_string(),
            endpoint: endpoint.into().trim().trim_end_matches('/').to_string(),
            models: ModelSet::default(),
        }
    }

    pub fn with_models(mut self, models: ModelSet) -> Self {
        self.models = models.normalized();
        self
    }

    pub fn endpoint_or_default(&self) -> &str {
        if self.endpoint.is_empty() {
            DEFAULT_GEMINI_ENDPOINT
        } else {
            &self.endpoint
        }
    }
}

/// How the provider should shape a `generateContent` response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    Text,
    /// Respond as JSON data constrained to the encoded schema, not prose.
    Json { schema: serde_json::Value },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentRequest {
    pub model_id: String,
    pub prompt: String,
    pub format: ResponseFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectRatio {
    #[default]
    Square,
    Landscape,
    Portrait,
    Classic,
    ClassicPortrait,
}

impl AspectRatio {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
            Self::Classic => "4:3",
            Self::ClassicPortrait => "3:4",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "1:1" => Some(Self::Square),
            "16:9" => Some(Self::Landscape),
            "9:16" => Some(Self::Portrait),
            "4:3" => Some(Self::Classic),
            "3:4" => Some(Self::ClassicPortrait),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub model_id: String,
    pub prompt: String,
    pub count: u32,
    pub aspect_ratio: AspectRatio,
    pub output_mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Image used to condition a video job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl InputImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRequest {
    pub model_id: String,
    pub prompt: String,
    pub count: u32,
    pub image: Option<InputImage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedVideo {
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoResponse {
    pub generated_videos: Vec<GeneratedVideo>,
}

/// Handle to a long-running provider job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    pub done: bool,
    pub response: Option<VideoResponse>,
}

impl Operation {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            done: false,
            response: None,
        }
    }

    pub fn completed(name: impl Into<String>, response: Option<VideoResponse>) -> Self {
        Self {
            name: name.into(),
            done: true,
            response,
        }
    }

    /// First non-blank video URI of a finished job, if the job produced one.
    pub fn result_uri(&self) -> Option<&str> {
        self.response
            .as_ref()?
            .generated_videos
            .first()?
            .uri
            .as_deref()
            .filter(|uri| !uri.trim().is_empty())
    }
}

/// Appends the provider access key so a produced video reference can be fetched.
pub fn authorized_download_url(uri: &str, api_key: &str) -> String {
    let separator = if uri.contains('?') { '&' } else { '?' };
    format!("{uri}{separator}key={api_key}")
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderError {
    #[snafu(display("missing API key for provider '{provider_id}'"))]
    MissingApiKey {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("provider '{provider_id}' is not supported"))]
    UnsupportedProvider {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("http client failed on `{stage}`, {source}"))]
    HttpClient {
        stage: &'static str,
        source: rig::http_client::Error,
    },
    #[snafu(display("completions failed on `{stage}`, {source}"))]
    CompletionsFailed {
        stage: &'static str,
        source: rig::completion::CompletionError,
    },
    #[snafu(display("request to provider failed on `{stage}`, {source}"))]
    Transport {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("{message}"))]
    ApiStatus {
        stage: &'static str,
        status: u16,
        message: String,
    },
    #[snafu(display("failed to decode provider payload on `{stage}`: {source}"))]
    Payload {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("provider returned invalid base64 image data on `{stage}`: {source}"))]
    DecodeImage {
        stage: &'static str,
        source: base64::DecodeError,
    },
    #[snafu(display("provider returned no usable content on `{stage}`: {details}"))]
    EmptyResponse {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("{message}"))]
    JobFailed {
        stage: &'static str,
        operation: String,
        code: Option<i64>,
        message: String,
    },
}

pub trait GenAiProvider: Send + Sync {
    fn id(&self) -> &str;
    fn generate_content<'a>(&'a self, request: ContentRequest) -> BoxFuture<'a, ProviderResult<String>>;
    fn generate_images<'a>(
        &'a self,
        request: ImageRequest,
    ) -> BoxFuture<'a, ProviderResult<Vec<GeneratedImage>>>;
    fn generate_videos<'a>(&'a self, request: VideoRequest) -> BoxFuture<'a, ProviderResult<Operation>>;
    fn refresh_operation<'a>(
        &'a self,
        operation: &'a Operation,
    ) -> BoxFuture<'a, ProviderResult<Operation>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_uri_ignores_missing_and_blank_references() {
        assert_eq!(Operation::completed("ops/1", None).result_uri(), None);
        assert_eq!(
            Operation::completed("ops/2", Some(VideoResponse::default())).result_uri(),
            None
        );

        let blank = VideoResponse {
            generated_videos: vec![GeneratedVideo {
                uri: Some("   ".to_string()),
            }],
        };
        assert_eq!(Operation::completed("ops/3", Some(blank)).result_uri(), None);

        let ready = VideoResponse {
            generated_videos: vec![GeneratedVideo {
                uri: Some("https://files.example/v1?alt=media".to_string()),
            }],
        };
        assert_eq!(
            Operation::completed("ops/4", Some(ready)).result_uri(),
            Some("https://files.example/v1?alt=media")
        );
    }

    #[test]
    fn download_url_picks_the_right_separator() {
        assert_eq!(
            authorized_download_url("https://files.example/v1?alt=media", "k"),
            "https://files.example/v1?alt=media&key=k"
        );
        assert_eq!(
            authorized_download_url("https://files.example/v1", "k"),
            "https://files.example/v1?key=k"
        );
    }

    #[test]
    fn endpoint_trailing_slash_is_trimmed() {
        let config = ProviderConfig::new("gemini", " key ", "https://proxy.example/v1beta/");
        assert_eq!(config.api_key, "key");
        assert_eq!(config.endpoint_or_default(), "https://proxy.example/v1beta");

        let config = ProviderConfig::new("gemini", "key", "");
        assert_eq!(config.endpoint_or_default(), DEFAULT_GEMINI_ENDPOINT);
    }

    #[test]
    fn aspect_ratio_parses_known_values_only() {
        assert_eq!(AspectRatio::parse("16:9"), Some(AspectRatio::Landscape));
        assert_eq!(AspectRatio::parse(" 1:1 "), Some(AspectRatio::Square));
        assert_eq!(AspectRatio::parse("2:1"), None);
    }
}
