use devchat::client::cli::{Repl, UserInput};
use devchat::client::{OpenAiSource, Orchestrator};
use devchat::config::{Cli, Settings};
use devchat::tools::{
    DisabledRunner, PythonRunner, Sandbox, ScriptRunner, ToolContext, WikipediaSearch,
    default_toolset,
};
use devchat::types::ToolExecutor;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Settings::load(&cli)?;
    let api_key = settings.api_key()?;
    let mut input = UserInput::new();

    let contact = match &settings.contact {
        Some(contact) => contact.clone(),
        None => input
            .read_line("what is your email (or contact point)?: ")
            .await?
            .unwrap_or_default(),
    };

    let scripts: Arc<dyn ScriptRunner> = if settings.scripts_enabled {
        Arc::new(PythonRunner::new(&settings.python))
    } else {
        Arc::new(DisabledRunner)
    };
    let context = ToolContext {
        sandbox: Sandbox::new(settings.sandbox_dir()?),
        search: WikipediaSearch::new(contact.trim())?,
        scripts,
    };
    let toolset = default_toolset().context("could not build toolset")?;
    let executor = ToolExecutor::new(Arc::new(toolset), context, settings.tool_timeout());

    let source = OpenAiSource::new(api_key, &settings.api_base);
    let orchestrator = Orchestrator::new(source, executor, settings.turn_settings());
    let mut repl = Repl::new(orchestrator, input).with_history_window(settings.history_window);
    repl.run().await
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
