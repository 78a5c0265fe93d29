use super::ToolContext;
use super::sandbox::SandboxError;
use crate::types::Tool;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
    List,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(
    title = "file_operation",
    description = "Perform file operations like read, write, or list in a safe directory."
)]
pub struct FileOperation {
    #[schemars(description = "The operation to perform: read, write or list.")]
    pub operation: Operation,

    #[schemars(description = "File or directory path, relative to the safe directory.")]
    pub path: String,

    #[serde(default)]
    #[schemars(description = "Content to write (for write operation).")]
    pub content: Option<String>,
}

#[async_trait]
impl Tool for FileOperation {
    type Context = ToolContext;

    async fn apply(&self, context: &ToolContext) -> anyhow::Result<String> {
        let sandbox = &context.sandbox;
        let output = match self.operation {
            Operation::Read => sandbox.read(&self.path).await?,
            Operation::Write => {
                let content = self
                    .content
                    .as_deref()
                    .ok_or(SandboxError::MissingContent)?;
                sandbox.write(&self.path, content).await?
            }
            Operation::List => sandbox.list(&self.path).await?,
        };
        Ok(output)
    }
}
