use std::fmt;

pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "imagen-4.0-generate-001";
pub const DEFAULT_VIDEO_MODEL: &str = "veo-2.0-generate-001";

/// The four kinds of output the provider can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    Text,
    Structured,
    Image,
    Video,
}

impl Modality {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Structured => "structured",
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    /// Message shown when a failure carries no text of its own.
    pub fn default_failure_message(self) -> &'static str {
        match self {
            Self::Text => "An error occurred during text generation.",
            Self::Structured => "An error occurred during JSON generation.",
            Self::Image => "An error occurred during image generation.",
            Self::Video => "An error occurred during video generation.",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

impl Model {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Model identifiers used per modality. Text and structured share a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSet {
    pub text: String,
    pub image: String,
    pub video: String,
}

impl Default for ModelSet {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEXT_MODEL.to_string(),
            image: DEFAULT_IMAGE_MODEL.to_string(),
            video: DEFAULT_VIDEO_MODEL.to_string(),
        }
    }
}

impl ModelSet {
    pub fn for_modality(&self, modality: Modality) -> &str {
        match modality {
            Modality::Text | Modality::Structured => &self.text,
            Modality::Image => &self.image,
            Modality::Video => &self.video,
        }
    }

    /// Blank entries fall back to the defaults.
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        Self {
            text: non_blank_or(self.text, defaults.text),
            image: non_blank_or(self.image, defaults.image),
            video: non_blank_or(self.video, defaults.video),
        }
    }
}

fn non_blank_or(value: String, fallback: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback
    } else {
        trimmed.to_string()
    }
}

pub fn default_gemini_models() -> Vec<Model> {
    vec![
        Model::new(DEFAULT_TEXT_MODEL, "Gemini 2.5 Flash")
            .with_description("Text and structured JSON output"),
        Model::new(DEFAULT_IMAGE_MODEL, "Imagen 4").with_description("Image generation"),
        Model::new(DEFAULT_VIDEO_MODEL, "Veo 2").with_description("Video generation, long running"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_model_ids_fall_back_to_defaults() {
        let models = ModelSet {
            text: "  ".to_string(),
            image: " imagen-3.0-generate-002 ".to_string(),
            video: String::new(),
        }
        .normalized();

        assert_eq!(models.text, DEFAULT_TEXT_MODEL);
        assert_eq!(models.image, "imagen-3.0-generate-002");
        assert_eq!(models.video, DEFAULT_VIDEO_MODEL);
    }

    #[test]
    fn default_catalog_covers_every_default_model() {
        let ids = default_gemini_models()
            .into_iter()
            .map(|model| model.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![DEFAULT_TEXT_MODEL, DEFAULT_IMAGE_MODEL, DEFAULT_VIDEO_MODEL]);
    }

    #[test]
    fn structured_output_shares_the_text_model() {
        let models = ModelSet::default();
        assert_eq!(
            models.for_modality(Modality::Structured),
            models.for_modality(Modality::Text)
        );
    }
}
