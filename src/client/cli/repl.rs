use super::io::{PROMPT, UserInput, clear_screen};
use crate::client::orchestrator::Orchestrator;
use crate::client::stream::CompletionSource;
use crate::conversation::{Conversation, DEFAULT_HISTORY_WINDOW};

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, PartialEq)]
pub enum Command {
    Exit,
    Clear,
    Temperature,
    Blank,
    Ask(String),
}

impl Command {
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        match trimmed.to_lowercase().as_str() {
            "" => Self::Blank,
            "exit" => Self::Exit,
            "clear" => Self::Clear,
            "temp" => Self::Temperature,
            _ => Self::Ask(trimmed.to_string()),
        }
    }
}

/// Parses a sampling temperature; anything that is not a finite,
/// non-negative float is rejected.
pub fn parse_temperature(input: &str) -> Option<f32> {
    input
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
}

pub struct Repl<S, C> {
    orchestrator: Orchestrator<S, C>,
    conversation: Conversation,
    input: UserInput,
    history_window: usize,
    default_temperature: f32,
}

impl<S: CompletionSource, C: Send + Sync> Repl<S, C> {
    pub fn new(orchestrator: Orchestrator<S, C>, input: UserInput) -> Self {
        Self {
            default_temperature: orchestrator.settings().temperature,
            orchestrator,
            conversation: Conversation::default(),
            input,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }

    pub fn with_history_window(mut self, history_window: usize) -> Self {
        self.history_window = history_window;
        self
    }

    pub async fn run(&mut self) -> Result<()> {
        println!("Devstral AI Chat (type 'exit' to quit, 'clear' to reset history)");
        println!(
            "Default temperature is set to {}. Type 'temp' to change it.",
            self.orchestrator.settings().temperature
        );

        loop {
            self.conversation.truncate(self.history_window);
            let Some(line) = self.input.read_line(PROMPT).await? else {
                println!();
                println!("Goodbye!");
                return Ok(());
            };

            match Command::parse(&line) {
                Command::Exit => {
                    println!("Goodbye!");
                    return Ok(());
                }
                Command::Clear => {
                    self.conversation.clear();
                    clear_screen().await?;
                }
                Command::Temperature => self.change_temperature().await?,
                Command::Blank => println!("Please enter a valid question."),
                Command::Ask(question) => self.ask(&question).await?,
            }
        }
    }

    async fn change_temperature(&mut self) -> Result<()> {
        let default = self.default_temperature;
        let prompt = format!("Enter temperature (default is {default}): ");
        let input = self.input.read_line(&prompt).await?.unwrap_or_default();
        let temperature = parse_temperature(&input).unwrap_or_else(|| {
            println!("Invalid temperature value. Using default ({default}).");
            default
        });
        self.orchestrator.set_temperature(temperature);
        Ok(())
    }

    async fn ask(&mut self, question: &str) -> Result<()> {
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            }
        });

        let mut stdout = tokio::io::stdout();
        let outcome = self
            .orchestrator
            .run_turn(&mut self.conversation, question, &mut stdout, &cancel)
            .await;
        watcher.abort();

        println!();
        if let Err(error) = outcome {
            warn!(%error, "turn failed");
            println!("Error: {error}");
        }
        Ok(())
    }
}
