use atelier_llm::{AspectRatio, Field, ImageOptions, Schema};
use atelier_storage::{CreationKind, HistoryItemId, NewHistoryItem};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use super::{Creator, GenerationSnafu, WorkflowResult, require};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebsiteRequest {
    pub niche: String,
    /// `single-page`, `landing-page`, `e-commerce` or `catalog`.
    pub site_type: String,
}

impl WebsiteRequest {
    pub fn new(niche: impl Into<String>) -> Self {
        Self {
            niche: niche.into(),
            site_type: "landing-page".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteSection {
    pub heading: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_to_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsiteBlueprint {
    pub title: String,
    #[serde(default)]
    pub niche: String,
    #[serde(rename = "type", default)]
    pub site_type: String,
    pub sections: Vec<WebsiteSection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionImage {
    pub section_index: usize,
    pub heading: String,
    pub data_uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebsiteCreation {
    pub blueprint: WebsiteBlueprint,
    /// Successful section images, in section order.
    pub images: Vec<SectionImage>,
    pub history_id: Option<HistoryItemId>,
}

pub fn website_schema() -> Schema {
    let section = Schema::object(vec![
        Field::required("heading", Schema::string().describe("Section heading.")),
        Field::required("content", Schema::string().describe("Section body text.")),
        Field::optional(
            "callToAction",
            Schema::string().describe("Call to action, if any."),
        ),
        Field::optional(
            "imagePrompt",
            Schema::string().describe("Prompt for an image that illustrates the section."),
        ),
    ]);

    Schema::object(vec![
        Field::required("title", Schema::string().describe("Main title of the site.")),
        Field::optional("niche", Schema::string().describe("Market niche of the site.")),
        Field::optional(
            "type",
            Schema::string().describe("Site type (landing-page, e-commerce, ...)."),
        ),
        Field::required("sections", Schema::array(section)),
    ])
}

impl Creator {
    pub async fn create_website(&self, request: WebsiteRequest) -> WorkflowResult<WebsiteCreation> {
        require(&request.niche, "niche", "website-validate")?;

        let prompt = format!(
            "Create a detailed blueprint for a \"{site_type}\" sales website in the \
             \"{niche}\" niche. Include a title and sections with headings, content, calls to \
             action and descriptive image prompts, plus structure and layout. The goal is a \
             professional site optimised for sales.",
            site_type = request.site_type,
            niche = request.niche.trim(),
        );
        let blueprint: WebsiteBlueprint = self
            .client
            .generate_structured(&prompt, &website_schema())
            .await
            .context(GenerationSnafu {
                stage: "website-blueprint",
            })?;

        // Recorded before the images so image failures cannot lose the blueprint.
        let history_id = match serde_json::to_value(&blueprint) {
            Ok(encoded) => self.record(
                NewHistoryItem::new(CreationKind::WebsiteCreator, format!("Site: {}", blueprint.title))
                    .with_input("niche", request.niche.trim())
                    .with_input("siteType", request.site_type.as_str())
                    .with_output("blueprint", encoded),
            ),
            Err(error) => {
                tracing::error!(error = %error, "failed to encode website blueprint for history");
                None
            }
        };

        let images = self.illustrate_sections(&blueprint).await;
        tracing::info!(
            sections = blueprint.sections.len(),
            images = images.len(),
            "website blueprint ready"
        );

        Ok(WebsiteCreation {
            blueprint,
            images,
            history_id,
        })
    }

    async fn illustrate_sections(&self, blueprint: &WebsiteBlueprint) -> Vec<SectionImage> {
        let jobs = blueprint
            .sections
            .iter()
            .enumerate()
            .filter_map(|(section_index, section)| {
                let prompt = section.image_prompt.as_deref()?.trim();
                if prompt.is_empty() {
                    return None;
                }

                Some(async move {
                    let options = ImageOptions::with_aspect_ratio(AspectRatio::Landscape);
                    match self.client.generate_image(prompt, options).await {
                        Ok(data_uri) => Some(SectionImage {
                            section_index,
                            heading: section.heading.clone(),
                            data_uri,
                        }),
                        Err(error) => {
                            tracing::warn!(
                                section = %section.heading,
                                error = %error,
                                "skipping section image"
                            );
                            None
                        }
                    }
                })
            });

        join_all(jobs).await.into_iter().flatten().collect()
    }
}
