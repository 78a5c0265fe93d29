use super::Tool;

use async_openai::types::{ChatCompletionTool, ChatCompletionToolType, FunctionObject};
use schemars::JsonSchema;
use schemars::r#gen::SchemaSettings;
use schemars::schema::{Schema, SchemaObject};
use serde::de::DeserializeOwned;
use serde_json::Error as JsonError;
use serde_json::Value;
use thiserror::Error;

type ToolTraitObject<C> = Box<dyn Tool<Context = C>>;
type Deserializer<C> = Box<dyn Fn(&str) -> Result<ToolTraitObject<C>, JsonError> + Send + Sync>;

/// What the model is told about a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub required: Vec<String>,
}

impl From<&ToolDescriptor> for ChatCompletionTool {
    fn from(value: &ToolDescriptor) -> Self {
        Self {
            r#type: ChatCompletionToolType::Function,
            function: FunctionObject {
                name: value.name.clone(),
                description: Some(value.description.clone()),
                parameters: Some(value.parameters.clone()),
                strict: None,
            },
        }
    }
}

pub struct ToolObject<C> {
    pub descriptor: ToolDescriptor,
    deserializer: Deserializer<C>,
    inline_deserializer: Deserializer<C>,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("missing metadata")]
    MissingMetadata,
    #[error("property `{0}` has no description")]
    MissingPropertyDescription(String),
    #[error("could not convert to json")]
    JsonSerialization(JsonError),
}

impl<C: Send + Sync> ToolObject<C> {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn try_deserialize(&self, data: &str) -> Result<ToolTraitObject<C>, JsonError> {
        // argument-less tools are sometimes called with an empty string
        let data = if data.trim().is_empty() { "{}" } else { data };
        (self.deserializer)(data)
    }

    pub fn try_deserialize_inline(&self, args: &str) -> Result<ToolTraitObject<C>, JsonError> {
        (self.inline_deserializer)(args)
    }
}

impl<C: Send + Sync + 'static> ToolObject<C> {
    pub fn try_from_tool<T>() -> Result<Self, ValidationError>
    where
        T: JsonSchema + Tool<Context = C> + DeserializeOwned + 'static,
    {
        let root = SchemaSettings::draft07()
            .with(|settings| settings.inline_subschemas = true)
            .into_generator()
            .into_root_schema_for::<T>();

        let (name, description) = validate_tool_schema(&root.schema)?;
        let required = root
            .schema
            .object
            .as_deref()
            .map(|object| object.required.iter().cloned().collect())
            .unwrap_or_default();

        let mut parameters =
            serde_json::to_value(&root.schema).map_err(ValidationError::JsonSerialization)?;
        if let Value::Object(map) = &mut parameters {
            map.remove("title");
            map.remove("description");
        }

        let deserializer = Box::new(|data: &str| {
            serde_json::from_str::<T>(data).map(|tool| Box::new(tool) as ToolTraitObject<C>)
        });
        let inline_deserializer = Box::new(|args: &str| {
            T::from_inline(args).map(|tool| Box::new(tool) as ToolTraitObject<C>)
        });

        Ok(Self {
            descriptor: ToolDescriptor {
                name,
                description,
                parameters,
                required,
            },
            deserializer,
            inline_deserializer,
        })
    }
}

fn validate_tool_schema(schema: &SchemaObject) -> Result<(String, String), ValidationError> {
    let metadata = schema
        .metadata
        .as_deref()
        .ok_or(ValidationError::MissingMetadata)?;
    let name = metadata
        .title
        .as_deref()
        .ok_or(ValidationError::MissingMetadata)?
        .to_string();
    let description = metadata
        .description
        .as_deref()
        .ok_or(ValidationError::MissingMetadata)?
        .to_string();

    if let Some(object) = schema.object.as_deref() {
        for (property, sub_schema) in &object.properties {
            validate_property_description(property, sub_schema)?;
        }
    }

    Ok((name, description))
}

fn validate_property_description(property: &str, schema: &Schema) -> Result<(), ValidationError> {
    let Schema::Object(object) = schema else {
        return Ok(());
    };
    object
        .metadata
        .as_deref()
        .and_then(|metadata| metadata.description.as_deref())
        .map(|_| ())
        .ok_or_else(|| ValidationError::MissingPropertyDescription(property.to_string()))
}
