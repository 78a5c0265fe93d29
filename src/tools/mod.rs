mod calculator;
mod clock;
mod file_operation;
mod sandbox;
mod script;
mod web_search;

pub use calculator::{ArithmeticError, CalculateMath, evaluate, format_number};
pub use clock::GetCurrentTime;
pub use file_operation::{FileOperation, Operation};
pub use sandbox::{DEFAULT_SANDBOX_DIR, Sandbox, SandboxError};
pub use script::{DisabledRunner, PythonRunner, RunPythonScript, ScriptRunner};
pub use web_search::{WIKIPEDIA_ENDPOINT, WebSearch, WikipediaSearch};

use crate::types::{ToolSet, ToolSetCreationError};
use std::sync::Arc;

/// Collaborators shared by every tool call.
#[derive(Clone)]
pub struct ToolContext {
    pub sandbox: Sandbox,
    pub search: WikipediaSearch,
    pub scripts: Arc<dyn ScriptRunner>,
}

pub fn default_toolset() -> Result<ToolSet<ToolContext>, ToolSetCreationError> {
    ToolSet::new()
        .add_tool::<GetCurrentTime>()?
        .add_tool::<WebSearch>()?
        .add_tool::<CalculateMath>()?
        .add_tool::<RunPythonScript>()?
        .add_tool::<FileOperation>()
}

#[cfg(test)]
pub(crate) fn test_context() -> (tempfile::TempDir, ToolContext) {
    let dir = tempfile::TempDir::new().unwrap();
    let context = ToolContext {
        sandbox: Sandbox::new(dir.path().join(DEFAULT_SANDBOX_DIR)),
        search: WikipediaSearch::with_endpoint("http://127.0.0.1:9/w/api.php", "tests").unwrap(),
        scripts: Arc::new(DisabledRunner),
    };
    (dir, context)
}
