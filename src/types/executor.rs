use super::toolset::{ToolCallError, ToolSet};

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How the arguments of a tool call arrived.
#[derive(Debug, Clone, Copy)]
pub enum Arguments<'a> {
    /// Raw text from an inline `[[name:args]]` marker.
    Inline(&'a str),
    /// JSON object text from a native tool call.
    Json(&'a str),
}

/// Runs tools by name and folds every outcome into text.
pub struct ToolExecutor<C> {
    toolset: Arc<ToolSet<C>>,
    context: C,
    timeout: Duration,
}

impl<C: Send + Sync> ToolExecutor<C> {
    pub fn new(toolset: Arc<ToolSet<C>>, context: C, timeout: Duration) -> Self {
        Self {
            toolset,
            context,
            timeout,
        }
    }

    pub fn toolset(&self) -> &ToolSet<C> {
        &self.toolset
    }

    pub async fn execute(&self, name: &str, arguments: Arguments<'_>) -> String {
        debug!(tool = name, ?arguments, "executing tool");
        let call = async {
            match arguments {
                Arguments::Inline(args) => {
                    self.toolset
                        .try_inline_call(&self.context, name, args)
                        .await
                }
                Arguments::Json(json) => self.toolset.try_tool_call(&self.context, name, json).await,
            }
        };

        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(Ok(text))) => text,
            Ok(Ok(Err(error))) => format!("Error in {name}: {error:#}"),
            Ok(Err(ToolCallError::NotFound(_))) => format!("Error: Unknown function '{name}'."),
            Ok(Err(error)) => format!("Error in {name}: {error}"),
            Err(_) => {
                warn!(tool = name, timeout = ?self.timeout, "tool call timed out");
                format!("Error in {name}: timed out after {}s", self.timeout.as_secs())
            }
        };
        info!(tool = name, bytes = result.len(), "tool call finished");
        result
    }
}
