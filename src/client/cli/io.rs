use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin};

pub const PROMPT: &str = "> ";

/// Line-oriented reader over stdin that keeps its buffer between prompts.
pub struct UserInput {
    reader: BufReader<Stdin>,
}

impl Default for UserInput {
    fn default() -> Self {
        Self::new()
    }
}

impl UserInput {
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
        }
    }

    /// Prints `prompt` and reads one line without its line ending.
    /// Returns `None` once stdin is closed.
    pub async fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        let mut output = tokio::io::stdout();
        output.write_all(prompt.as_bytes()).await?;
        output.flush().await?;

        let mut buffer = String::new();
        if self.reader.read_line(&mut buffer).await? == 0 {
            return Ok(None);
        }
        let line = buffer.trim_end_matches(['\r', '\n']).to_string();
        Ok(Some(line))
    }
}

pub async fn clear_screen() -> Result<()> {
    let mut output = tokio::io::stdout();
    output.write_all(b"\x1B[2J\x1B[1;1H").await?;
    output.flush().await?;
    Ok(())
}
