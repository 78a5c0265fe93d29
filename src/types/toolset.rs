use super::Tool;
use super::tool_object::{ToolDescriptor, ToolObject, ValidationError};

use async_openai::types::ChatCompletionTool;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolSetCreationError {
    #[error("error validating schema: {0}")]
    Validation(ValidationError),
    #[error("two or more tools have the same name: {0}")]
    NameConflict(String),
}

#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("error deserializing tool call (possible hallucination): {0}")]
    Deserialization(serde_json::Error),
    #[error("tool not in toolset: {0}")]
    NotFound(String),
}

/// A closed, ordered set of tools sharing one execution context.
pub struct ToolSet<C> {
    tools: Vec<ToolObject<C>>,
}

impl<C> Default for ToolSet<C> {
    fn default() -> Self {
        Self { tools: Vec::new() }
    }
}

impl<C: Send + Sync + 'static> ToolSet<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tool<T>(mut self) -> Result<Self, ToolSetCreationError>
    where
        T: JsonSchema + Tool<Context = C> + DeserializeOwned + 'static,
    {
        let tool_object =
            ToolObject::try_from_tool::<T>().map_err(ToolSetCreationError::Validation)?;
        if self.resolve(tool_object.name()).is_ok() {
            Err(ToolSetCreationError::NameConflict(
                tool_object.name().to_string(),
            ))
        } else {
            self.tools.push(tool_object);
            Ok(self)
        }
    }
}

impl<C: Send + Sync> ToolSet<C> {
    /// Descriptors in registration order.
    pub fn describe(&self) -> Vec<&ToolDescriptor> {
        self.tools.iter().map(|tool| &tool.descriptor).collect()
    }

    pub fn resolve(&self, tool_name: &str) -> Result<&ToolObject<C>, ToolCallError> {
        self.tools
            .iter()
            .find(|tool| tool.name() == tool_name)
            .ok_or_else(|| ToolCallError::NotFound(tool_name.to_owned()))
    }

    pub async fn try_tool_call(
        &self,
        context: &C,
        tool_name: &str,
        json: &str,
    ) -> Result<anyhow::Result<String>, ToolCallError> {
        let tool = self.resolve(tool_name).and_then(|tool| {
            tool.try_deserialize(json)
                .map_err(ToolCallError::Deserialization)
        })?;
        Ok(tool.apply(context).await)
    }

    pub async fn try_inline_call(
        &self,
        context: &C,
        tool_name: &str,
        args: &str,
    ) -> Result<anyhow::Result<String>, ToolCallError> {
        let tool = self.resolve(tool_name).and_then(|tool| {
            tool.try_deserialize_inline(args)
                .map_err(ToolCallError::Deserialization)
        })?;
        Ok(tool.apply(context).await)
    }

    pub fn openai_chatcompletion_toolset(&self) -> Vec<ChatCompletionTool> {
        self.describe()
            .into_iter()
            .map(ChatCompletionTool::from)
            .collect()
    }
}
