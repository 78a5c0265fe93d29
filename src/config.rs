// Configuration: built-in defaults < ~/.devchat/config.toml < environment < flags

use crate::client::orchestrator::{
    DEFAULT_MAX_TOOL_DEPTH, DEFAULT_MODEL, DEFAULT_TEMPERATURE, TurnSettings,
};
use crate::client::stream::MISTRAL_API_BASE;
use crate::conversation::DEFAULT_HISTORY_WINDOW;
use crate::tools::DEFAULT_SANDBOX_DIR;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_KEY_VAR: &str = "MISTRAL_API_KEY";
pub const CONTACT_VAR: &str = "DEVCHAT_CONTACT";

#[derive(Debug, Parser)]
#[command(name = "devchat", version, about = "Chat with a hosted model that can call local tools")]
pub struct Cli {
    /// Path to a TOML config file (default: ~/.devchat/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Model id
    #[arg(long)]
    pub model: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long)]
    pub api_base: Option<String>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Contact string sent with web searches
    #[arg(long)]
    pub contact: Option<String>,

    /// Directory file operations are confined to
    #[arg(long)]
    pub sandbox: Option<PathBuf>,

    /// Maximum chained inline tool calls per turn
    #[arg(long)]
    pub max_tool_depth: Option<usize>,

    /// Disable the script tool
    #[arg(long)]
    pub no_scripts: bool,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub history_window: usize,
    pub max_tool_depth: usize,
    pub tool_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub contact: Option<String>,
    pub sandbox_dir: Option<PathBuf>,
    pub scripts_enabled: bool,
    pub python: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: MISTRAL_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            history_window: DEFAULT_HISTORY_WINDOW,
            max_tool_depth: DEFAULT_MAX_TOOL_DEPTH,
            tool_timeout_secs: 30,
            request_timeout_secs: 120,
            contact: None,
            sandbox_dir: None,
            scripts_enabled: true,
            python: "python3".to_string(),
        }
    }
}

impl Settings {
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut settings = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        settings.apply_env(|key| std::env::var(key).ok());
        settings.apply_cli(cli);
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api_key) = lookup(API_KEY_VAR).filter(|value| !value.is_empty()) {
            self.api_key = Some(api_key);
        }
        if let Some(contact) = lookup(CONTACT_VAR).filter(|value| !value.is_empty()) {
            self.contact = Some(contact);
        }
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(model) = &cli.model {
            self.model.clone_from(model);
        }
        if let Some(api_base) = &cli.api_base {
            self.api_base.clone_from(api_base);
        }
        if let Some(temperature) = cli.temperature {
            self.temperature = temperature;
        }
        if let Some(contact) = &cli.contact {
            self.contact = Some(contact.clone());
        }
        if let Some(sandbox) = &cli.sandbox {
            self.sandbox_dir = Some(sandbox.clone());
        }
        if let Some(depth) = cli.max_tool_depth {
            self.max_tool_depth = depth;
        }
        if cli.no_scripts {
            self.scripts_enabled = false;
        }
    }

    pub fn api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => bail!(
                "No API key configured.\n\n\
                Set it in the environment:\n\
                export {API_KEY_VAR}=\"...\"\n\n\
                or add `api_key = \"...\"` to ~/.devchat/config.toml"
            ),
        }
    }

    pub fn sandbox_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.sandbox_dir {
            return Ok(dir.clone());
        }
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(DEFAULT_SANDBOX_DIR))
    }

    pub fn turn_settings(&self) -> TurnSettings {
        TurnSettings {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tool_depth: self.max_tool_depth,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".devchat").join("config.toml"))
}
