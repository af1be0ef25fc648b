use atelier_llm::{DEFAULT_TEXT_MODEL, Field, Schema};
use atelier_storage::{CreationKind, HistoryItemId, NewHistoryItem};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use super::{Creator, GenerationSnafu, WorkflowResult, require};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppBlueprintRequest {
    pub idea: String,
    /// Model the generated app should prefer for its AI features.
    pub model_preference: String,
}

impl AppBlueprintRequest {
    pub fn new(idea: impl Into<String>) -> Self {
        Self {
            idea: idea.into(),
            model_preference: DEFAULT_TEXT_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppFeature {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_model_used: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppBlueprint {
    pub app_name: String,
    pub description: String,
    pub features: Vec<AppFeature>,
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub user_stories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pseudo_code_snippet: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppCreation {
    pub blueprint: AppBlueprint,
    pub history_id: Option<HistoryItemId>,
}

pub fn app_blueprint_schema() -> Schema {
    let feature = Schema::object(vec![
        Field::required("name", Schema::string().describe("Feature name.")),
        Field::required("description", Schema::string().describe("What the feature does.")),
        Field::optional(
            "aiModelUsed",
            Schema::string().describe("Preferred AI model for this feature, if any."),
        ),
    ]);

    Schema::object(vec![
        Field::required("appName", Schema::string().describe("Suggested app name.")),
        Field::required(
            "description",
            Schema::string().describe("Detailed description of the app."),
        ),
        Field::required("features", Schema::array(feature)),
        Field::required(
            "techStack",
            Schema::array(Schema::string()).describe("Recommended technology stack."),
        ),
        Field::optional(
            "userStories",
            Schema::array(Schema::string()).describe("Example user stories."),
        ),
        Field::optional(
            "pseudoCodeSnippet",
            Schema::string().describe("Pseudo-code or high level structure for a key feature."),
        ),
    ])
}

impl Creator {
    pub async fn create_app_blueprint(&self, request: AppBlueprintRequest) -> WorkflowResult<AppCreation> {
        require(&request.idea, "idea", "app-blueprint-validate")?;

        let prompt = format!(
            "Generate a complete blueprint for an app based on this idea: \"{idea}\". The app \
             should make use of AI models, preferably \"{model}\". Include:\n\
             1. A suggested name for the app.\n\
             2. A detailed description.\n\
             3. The key features, each described and naming the AI model it could use.\n\
             4. A recommended technology stack.\n\
             5. A few user stories.\n\
             6. A pseudo-code snippet or high level structure for a core feature.",
            idea = request.idea.trim(),
            model = request.model_preference,
        );
        let blueprint: AppBlueprint = self
            .client
            .generate_structured(&prompt, &app_blueprint_schema())
            .await
            .context(GenerationSnafu {
                stage: "app-blueprint",
            })?;

        let history_id = match serde_json::to_value(&blueprint) {
            Ok(encoded) => self.record(
                NewHistoryItem::new(CreationKind::AppCreator, format!("App: {}", blueprint.app_name))
                    .with_input("appIdea", request.idea.trim())
                    .with_input("aiModelPreference", request.model_preference.as_str())
                    .with_output("blueprint", encoded),
            ),
            Err(error) => {
                tracing::error!(error = %error, "failed to encode app blueprint for history");
                None
            }
        };

        Ok(AppCreation {
            blueprint,
            history_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::workflows::testing::{FakeProvider, harness};

    #[tokio::test]
    async fn blueprint_is_decoded_and_recorded() {
        let body = json!({
            "appName": "FitAI",
            "description": "Personal trainer in your pocket",
            "features": [
                { "name": "Plans", "description": "Weekly plans", "aiModelUsed": "gemini-2.5-flash" },
                { "name": "Form check", "description": "Video feedback" }
            ],
            "techStack": ["Rust", "Postgres"]
        });
        let setup = harness(FakeProvider::default().with_content(Ok(body.to_string())));

        let created = setup
            .creator
            .create_app_blueprint(AppBlueprintRequest::new("a fitness coach"))
            .await
            .expect("blueprint");

        assert_eq!(created.blueprint.app_name, "FitAI");
        assert_eq!(created.blueprint.features[1].ai_model_used, None);
        assert!(created.blueprint.user_stories.is_empty());
        assert!(setup.provider.content_prompts()[0].contains("\"a fitness coach\""));

        let item = setup
            .history
            .get(created.history_id.expect("recorded"))
            .expect("present");
        assert_eq!(item.title, "App: FitAI");
        assert_eq!(item.input["aiModelPreference"], "gemini-2.5-flash");
        assert_eq!(item.output["blueprint"]["techStack"], json!(["Rust", "Postgres"]));
    }

    #[test]
    fn schema_requires_the_core_fields_only() {
        let encoded = app_blueprint_schema().to_provider_json();
        assert_eq!(
            encoded["required"],
            json!(["appName", "description", "features", "techStack"])
        );
        assert_eq!(encoded["properties"]["techStack"]["items"]["type"], "STRING");
    }

    #[tokio::test]
    async fn blank_idea_is_rejected() {
        let setup = harness(FakeProvider::default());

        let error = setup
            .creator
            .create_app_blueprint(AppBlueprintRequest::new(" "))
            .await
            .expect_err("blank idea");

        assert!(error.is_input_error());
        assert_eq!(setup.provider.call_count(), 0);
    }
}
