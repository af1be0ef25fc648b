use atelier_llm::InputImage;
use atelier_storage::{CreationKind, HistoryItemId, NewHistoryItem};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use snafu::{ResultExt, ensure};

use super::{Creator, GenerationSnafu, MissingInputSnafu, WorkflowResult, preview, require};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterVideoRequest {
    pub idea: String,
    pub style: String,
    pub duration: String,
}

impl CharacterVideoRequest {
    pub fn new(idea: impl Into<String>) -> Self {
        Self {
            idea: idea.into(),
            style: "cartoon".to_string(),
            duration: "30-60 seconds".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageToVideoRequest {
    pub image: InputImage,
    pub file_name: String,
    pub animation_style: String,
    pub instructions: Option<String>,
}

impl ImageToVideoRequest {
    pub fn new(image: InputImage, file_name: impl Into<String>) -> Self {
        Self {
            image,
            file_name: file_name.into(),
            animation_style: "cinematic".to_string(),
            instructions: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViralVideoRequest {
    pub topic: String,
    pub platform: String,
    pub style: String,
}

impl ViralVideoRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            platform: "TikTok".to_string(),
            style: "user-generated-content".to_string(),
        }
    }
}

/// `video_url` is `None` when the job finished without a result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VideoOutcome {
    pub video_url: Option<String>,
    pub history_id: Option<HistoryItemId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterVideo {
    pub script: String,
    pub video: VideoOutcome,
}

impl Creator {
    pub async fn create_character_video(
        &self,
        request: CharacterVideoRequest,
    ) -> WorkflowResult<CharacterVideo> {
        require(&request.idea, "idea", "character-video-validate")?;

        let script_prompt = format!(
            "Write a detailed visual script and description for a video with animated \
             characters in the \"{style}\" style, based on this content idea: \"{idea}\". \
             The video should run for about {duration}. Describe the scenes, the characters' \
             actions and any dialogue.",
            style = request.style,
            idea = request.idea.trim(),
            duration = request.duration,
        );
        let script = self
            .client
            .generate_text(&script_prompt)
            .await
            .context(GenerationSnafu {
                stage: "character-video-script",
            })?;

        let video_prompt = format!(
            "Generate an animated video. Style: \"{style}\". Duration: \"{duration}\". \
             Focus on animated characters and follow the script strictly. Script: \"{script}\"",
            style = request.style,
            duration = request.duration,
        );
        let video_url = self
            .client
            .generate_video_with_cancel(&video_prompt, None, self.cancel.clone())
            .await
            .context(GenerationSnafu {
                stage: "character-video-render",
            })?;

        let history_id = video_url.as_ref().and_then(|url| {
            self.record(
                NewHistoryItem::new(CreationKind::VideoCreation, format!("Video: {}", preview(&request.idea)))
                    .with_input("script", request.idea.trim())
                    .with_input("style", request.style.as_str())
                    .with_input("duration", request.duration.as_str())
                    .with_output("scriptPreview", script.as_str())
                    .with_output("videoUrl", url.as_str()),
            )
        });

        Ok(CharacterVideo {
            script,
            video: VideoOutcome {
                video_url,
                history_id,
            },
        })
    }

    pub async fn image_to_video(&self, request: ImageToVideoRequest) -> WorkflowResult<VideoOutcome> {
        ensure!(
            !request.image.bytes.is_empty(),
            MissingInputSnafu {
                stage: "image-to-video-validate",
                field: "image",
            }
        );
        require(&request.image.mime_type, "image MIME type", "image-to-video-validate")?;
        require(&request.file_name, "file name", "image-to-video-validate")?;

        let mut prompt = format!(
            "Turn this image into an animated video in a \"{}\" style. Add motion, transitions \
             and visual effects that enhance the image.",
            request.animation_style
        );
        if let Some(instructions) = request
            .instructions
            .as_deref()
            .map(str::trim)
            .filter(|instructions| !instructions.is_empty())
        {
            prompt.push_str(" Additional instructions: ");
            prompt.push_str(instructions);
        }

        let video_url = self
            .client
            .generate_video_with_cancel(&prompt, Some(request.image.clone()), self.cancel.clone())
            .await
            .context(GenerationSnafu {
                stage: "image-to-video-render",
            })?;

        let history_id = video_url.as_ref().and_then(|url| {
            self.record(
                NewHistoryItem::new(
                    CreationKind::ImageToVideo,
                    format!("Image video: {}", request.file_name.trim()),
                )
                .with_input("fileName", request.file_name.trim())
                .with_input("animationStyle", request.animation_style.as_str())
                .with_input("customPrompt", request.instructions.clone().unwrap_or_default())
                .with_output("videoUrl", url.as_str())
                .with_output("imageBase64", BASE64_STANDARD.encode(&request.image.bytes)),
            )
        });

        Ok(VideoOutcome {
            video_url,
            history_id,
        })
    }

    pub async fn create_viral_video(&self, request: ViralVideoRequest) -> WorkflowResult<VideoOutcome> {
        require(&request.topic, "topic", "viral-video-validate")?;

        let prompt = format!(
            "Create a realistic video with high viral potential for {platform} about the \
             following topic: \"{topic}\". The style should be \"{style}\", imitating \
             authentic and engaging content. Keep it short (under 60 seconds), impactful, and \
             hook the viewer within the first 3 seconds. Include elements that encourage \
             sharing, such as a surprising twist, humour, a strong emotional appeal or a \
             shocking fact. The visuals must be realistic and believable for the chosen style.",
            platform = request.platform,
            topic = request.topic.trim(),
            style = request.style,
        );

        let video_url = self
            .client
            .generate_video_with_cancel(&prompt, None, self.cancel.clone())
            .await
            .context(GenerationSnafu {
                stage: "viral-video-render",
            })?;

        let history_id = video_url.as_ref().and_then(|url| {
            self.record(
                NewHistoryItem::new(
                    CreationKind::ViralVideo,
                    format!("Viral video: {}", preview(&request.topic)),
                )
                .with_input("topic", request.topic.trim())
                .with_input("platform", request.platform.as_str())
                .with_input("style", request.style.as_str())
                .with_output("videoUrl", url.as_str()),
            )
        });

        Ok(VideoOutcome {
            video_url,
            history_id,
        })
    }
}
