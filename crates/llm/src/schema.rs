//! Declarative description of structured output.
//!
//! A [`Schema`] is encoded into the provider's `responseSchema` format when a
//! structured request is sent, and the same value validates the returned body
//! before it is deserialized into the caller's type.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use snafu::{ResultExt, Snafu};

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaKind {
    String,
    Number,
    Integer,
    Boolean,
    Array(Box<Schema>),
    /// Fields keep their declaration order; it becomes `propertyOrdering`.
    Object(Vec<Field>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub kind: SchemaKind,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub schema: Schema,
    pub required: bool,
}

impl Field {
    pub fn required(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            required: false,
        }
    }
}

impl Schema {
    fn of(kind: SchemaKind) -> Self {
        Self {
            kind,
            description: None,
        }
    }

    pub fn string() -> Self {
        Self::of(SchemaKind::String)
    }

    pub fn number() -> Self {
        Self::of(SchemaKind::Number)
    }

    pub fn integer() -> Self {
        Self::of(SchemaKind::Integer)
    }

    pub fn boolean() -> Self {
        Self::of(SchemaKind::Boolean)
    }

    pub fn array(items: Schema) -> Self {
        Self::of(SchemaKind::Array(Box::new(items)))
    }

    pub fn object(fields: Vec<Field>) -> Self {
        Self::of(SchemaKind::Object(fields))
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn type_name(&self) -> &'static str {
        match self.kind {
            SchemaKind::String => "STRING",
            SchemaKind::Number => "NUMBER",
            SchemaKind::Integer => "INTEGER",
            SchemaKind::Boolean => "BOOLEAN",
            SchemaKind::Array(_) => "ARRAY",
            SchemaKind::Object(_) => "OBJECT",
        }
    }

    /// Encodes the schema in the provider's OpenAPI-subset dialect.
    pub fn to_provider_json(&self) -> Value {
        let mut encoded = Map::new();
        encoded.insert("type".to_string(), json!(self.type_name()));
        if let Some(description) = &self.description {
            encoded.insert("description".to_string(), json!(description));
        }

        match &self.kind {
            SchemaKind::Array(items) => {
                encoded.insert("items".to_string(), items.to_provider_json());
            }
            SchemaKind::Object(fields) => {
                let properties = fields
                    .iter()
                    .map(|field| (field.name.clone(), field.schema.to_provider_json()))
                    .collect::<Map<_, _>>();
                let ordering = fields.iter().map(|field| json!(field.name)).collect::<Vec<_>>();
                let required = fields
                    .iter()
                    .filter(|field| field.required)
                    .map(|field| json!(field.name))
                    .collect::<Vec<_>>();

                encoded.insert("properties".to_string(), Value::Object(properties));
                encoded.insert("propertyOrdering".to_string(), Value::Array(ordering));
                if !required.is_empty() {
                    encoded.insert("required".to_string(), Value::Array(required));
                }
            }
            _ => {}
        }

        Value::Object(encoded)
    }

    /// Checks a decoded value against the schema. Unknown object keys are allowed.
    pub fn validate(&self, value: &Value) -> DecodeResult<()> {
        self.validate_at("$", value)
    }

    fn validate_at(&self, path: &str, value: &Value) -> DecodeResult<()> {
        let matches = match (&self.kind, value) {
            (SchemaKind::String, Value::String(_)) => true,
            (SchemaKind::Number, Value::Number(_)) => true,
            (SchemaKind::Integer, Value::Number(number)) => number.is_i64() || number.is_u64(),
            (SchemaKind::Boolean, Value::Bool(_)) => true,
            (SchemaKind::Array(items), Value::Array(elements)) => {
                for (index, element) in elements.iter().enumerate() {
                    items.validate_at(&format!("{path}[{index}]"), element)?;
                }
                true
            }
            (SchemaKind::Object(fields), Value::Object(entries)) => {
                for field in fields {
                    let field_path = format!("{path}.{}", field.name);
                    match entries.get(&field.name) {
                        None | Some(Value::Null) if field.required => {
                            return MissingFieldSnafu {
                                stage: "schema-validate-object",
                                path: field_path,
                            }
                            .fail();
                        }
                        None | Some(Value::Null) => {}
                        Some(nested) => field.schema.validate_at(&field_path, nested)?,
                    }
                }
                true
            }
            _ => false,
        };

        if matches {
            Ok(())
        } else {
            TypeMismatchSnafu {
                stage: "schema-validate-type",
                path: path.to_string(),
                expected: self.type_name(),
                found: json_type_name(value),
            }
            .fail()
        }
    }

    /// Parses a provider body, validates it, then deserializes it into `T`.
    pub fn decode<T: DeserializeOwned>(&self, body: &str) -> DecodeResult<T> {
        let value: Value = serde_json::from_str(body.trim()).context(MalformedJsonSnafu {
            stage: "schema-decode-parse",
        })?;
        self.validate(&value)?;
        serde_json::from_value(value).context(ShapeSnafu {
            stage: "schema-decode-deserialize",
        })
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DecodeError {
    #[snafu(display("response body is not well-formed JSON: {source}"))]
    MalformedJson {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("response is missing required field `{path}`"))]
    MissingField { stage: &'static str, path: String },
    #[snafu(display("response field `{path}` should be {expected} but was {found}"))]
    TypeMismatch {
        stage: &'static str,
        path: String,
        expected: &'static str,
        found: &'static str,
    },
    #[snafu(display("response does not match the requested shape: {source}"))]
    Shape {
        stage: &'static str,
        source: serde_json::Error,
    },
}

pub type DecodeResult<T> = Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    fn section_schema() -> Schema {
        Schema::object(vec![
            Field::required("heading", Schema::string()),
            Field::required("content", Schema::string().describe("Body text.")),
            Field::optional("imagePrompt", Schema::string()),
        ])
    }

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Section {
        heading: String,
        content: String,
        image_prompt: Option<String>,
    }

    #[test]
    fn encoding_keeps_field_order_and_required_list() {
        let encoded = Schema::array(section_schema()).to_provider_json();

        assert_eq!(encoded["type"], "ARRAY");
        let items = &encoded["items"];
        assert_eq!(items["type"], "OBJECT");
        assert_eq!(
            items["propertyOrdering"],
            json!(["heading", "content", "imagePrompt"])
        );
        assert_eq!(items["required"], json!(["heading", "content"]));
        assert_eq!(items["properties"]["content"]["description"], "Body text.");
        assert_eq!(items["properties"]["imagePrompt"]["type"], "STRING");
    }

    #[test]
    fn scalar_encoding_has_no_object_keys() {
        let encoded = Schema::integer().to_provider_json();
        assert_eq!(encoded, json!({ "type": "INTEGER" }));
    }

    #[test]
    fn decode_accepts_missing_optional_fields() {
        let section: Section = section_schema()
            .decode("  {\"heading\":\"Hero\",\"content\":\"Welcome\"}\n")
            .expect("valid body should decode");

        assert_eq!(
            section,
            Section {
                heading: "Hero".to_string(),
                content: "Welcome".to_string(),
                image_prompt: None,
            }
        );
    }

    #[test]
    fn decode_rejects_prose() {
        let error = section_schema()
            .decode::<Section>("Here is your website blueprint!")
            .expect_err("prose must not decode");
        assert!(matches!(error, DecodeError::MalformedJson { .. }));
    }

    #[test]
    fn decode_reports_the_path_of_a_missing_field() {
        let error = Schema::array(section_schema())
            .decode::<Vec<Section>>("[{\"heading\":\"Hero\",\"content\":\"x\"},{\"heading\":\"Pricing\"}]")
            .expect_err("second element lacks content");

        match error {
            DecodeError::MissingField { path, .. } => assert_eq!(path, "$[1].content"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn decode_reports_type_mismatches() {
        let error = section_schema()
            .decode::<Section>("{\"heading\":3,\"content\":\"x\"}")
            .expect_err("heading must be a string");

        match error {
            DecodeError::TypeMismatch {
                path,
                expected,
                found,
                ..
            } => {
                assert_eq!(path, "$.heading");
                assert_eq!(expected, "STRING");
                assert_eq!(found, "number");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn integers_reject_fractions() {
        assert!(Schema::integer().validate(&json!(3)).is_ok());
        assert!(Schema::integer().validate(&json!(3.5)).is_err());
        assert!(Schema::number().validate(&json!(3.5)).is_ok());
    }
}
