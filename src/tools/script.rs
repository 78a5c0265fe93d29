use super::ToolContext;
use crate::types::Tool;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

pub const NO_RESULT: &str = "Script executed successfully.";

/// Executes model-supplied code. Not a security boundary.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(&self, code: &str) -> Result<String>;
}

pub struct DisabledRunner;

#[async_trait]
impl ScriptRunner for DisabledRunner {
    async fn run(&self, _: &str) -> Result<String> {
        bail!("script execution is disabled")
    }
}

// The script's own prints go to stderr so stdout only carries `result`.
const HARNESS: &str = r#"
import sys
_source = sys.stdin.read()
_stdout = sys.stdout
sys.stdout = sys.stderr
_namespace = {"__name__": "__main__"}
exec(compile(_source, "<script>", "exec"), _namespace)
sys.stdout = _stdout
if "result" in _namespace:
    sys.stdout.write(str(_namespace["result"]))
else:
    sys.stdout.write(sys.argv[1])
"#;

/// Runs scripts in a fresh `python3` process with an empty namespace.
pub struct PythonRunner {
    interpreter: PathBuf,
}

impl PythonRunner {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }
}

#[async_trait]
impl ScriptRunner for PythonRunner {
    async fn run(&self, code: &str) -> Result<String> {
        debug!(interpreter = %self.interpreter.display(), bytes = code.len(), "running script");
        let mut child = Command::new(&self.interpreter)
            .arg("-c")
            .arg(HARNESS)
            .arg(NO_RESULT)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start {}", self.interpreter.display()))?;

        let mut stdin = child.stdin.take().context("script stdin was not piped")?;
        stdin
            .write_all(code.as_bytes())
            .await
            .context("failed to send script")?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .context("failed to wait for script")?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("script failed without output");
        bail!("{}", reason.trim())
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(
    title = "run_python_script",
    description = "Execute a Python script and return the output or error."
)]
pub struct RunPythonScript {
    #[schemars(
        description = "The Python code to execute. Must be valid Python 3 code. You can define a 'result' variable to return output."
    )]
    pub code: String,
}

#[async_trait]
impl Tool for RunPythonScript {
    type Context = ToolContext;

    async fn apply(&self, context: &ToolContext) -> Result<String> {
        context.scripts.run(&self.code).await
    }

    fn from_inline(args: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            code: args.to_string(),
        })
    }
}
