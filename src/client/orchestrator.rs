use super::stream::{CompletionRequest, CompletionSource, EventStream, StreamEvent, ToolCall};
use crate::conversation::{
    Conversation, assistant_message, assistant_tool_calls, tool_message, user_message,
};
use crate::marker::{self, InlineMarker};
use crate::types::{Arguments, ToolExecutor};

use async_openai::types::FinishReason;
use futures::stream::StreamExt;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_MODEL: &str = "devstral-small-latest";
pub const DEFAULT_TEMPERATURE: f32 = 0.15;
pub const DEFAULT_MAX_TOOL_DEPTH: usize = 8;

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("tool-call depth exceeded (limit {0})")]
    ToolDepthExceeded(usize),
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("cancelled")]
    Cancelled,
    #[error("could not write output: {0}")]
    Output(#[from] std::io::Error),
    #[error("{0:#}")]
    Api(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tool_depth: usize,
    pub request_timeout: Duration,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tool_depth: DEFAULT_MAX_TOOL_DEPTH,
            request_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug)]
enum TurnState {
    Streaming,
    MarkerFound(InlineMarker),
    ToolRoundTrip(Vec<ToolCall>),
    Done,
}

struct ActiveStream {
    events: EventStream,
    deadline: Instant,
}

/// Drives the chained completion streams of one user turn.
pub struct Orchestrator<S, C> {
    source: S,
    executor: ToolExecutor<C>,
    settings: TurnSettings,
}

impl<S: CompletionSource, C: Send + Sync> Orchestrator<S, C> {
    pub fn new(source: S, executor: ToolExecutor<C>, settings: TurnSettings) -> Self {
        Self {
            source,
            executor,
            settings,
        }
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    pub fn set_temperature(&mut self, temperature: f32) {
        self.settings.temperature = temperature;
    }

    /// Runs one turn for `user_input`, streaming text to `out` as it arrives.
    ///
    /// Every message the turn produces, the final assistant text included, is
    /// appended to `conversation`. The final text is also returned.
    pub async fn run_turn<W>(
        &self,
        conversation: &mut Conversation,
        user_input: &str,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> Result<String, TurnError>
    where
        W: AsyncWrite + Unpin,
    {
        conversation.push(user_message(user_input));

        let mut stream = self.open(conversation, cancel).await?;
        let mut content = String::new();
        let mut buffer = String::new();
        let mut pending: Vec<ToolCall> = Vec::new();
        let mut depth = 0;
        let mut state = TurnState::Streaming;

        loop {
            state = match state {
                TurnState::Streaming => match self.next_event(&mut stream, cancel).await? {
                    Some(StreamEvent::Text(text)) => {
                        out.write_all(text.as_bytes()).await?;
                        out.flush().await?;
                        buffer.push_str(&text);
                        match marker::scan(&buffer) {
                            Some(found) => TurnState::MarkerFound(found),
                            None => TurnState::Streaming,
                        }
                    }
                    Some(StreamEvent::ToolCall(call)) => {
                        pending.push(call);
                        TurnState::Streaming
                    }
                    Some(StreamEvent::Finished(FinishReason::ToolCalls)) => {
                        TurnState::ToolRoundTrip(std::mem::take(&mut pending))
                    }
                    Some(StreamEvent::Finished(_)) => TurnState::Streaming,
                    None if !pending.is_empty() => {
                        TurnState::ToolRoundTrip(std::mem::take(&mut pending))
                    }
                    None => TurnState::Done,
                },

                TurnState::MarkerFound(found) => {
                    depth += 1;
                    if depth > self.settings.max_tool_depth {
                        warn!(limit = self.settings.max_tool_depth, "inline tool chain too deep");
                        return Err(TurnError::ToolDepthExceeded(self.settings.max_tool_depth));
                    }
                    content.push_str(&buffer[..found.start]);
                    let result = self
                        .execute(&found.name, Arguments::Inline(&found.args), out, cancel)
                        .await?;

                    conversation.push(assistant_message(std::mem::take(&mut content)));
                    conversation.push(assistant_message(format!(
                        "[{} result: {}]",
                        found.name, result
                    )));
                    buffer = buffer[found.end..].to_string();

                    // a second marker may already sit in the rest of the delta
                    match marker::scan(&buffer) {
                        Some(next) => TurnState::MarkerFound(next),
                        None => {
                            if !pending.is_empty() {
                                debug!(dropped = pending.len(), "abandoning stream with pending tool calls");
                                pending.clear();
                            }
                            stream = self.open(conversation, cancel).await?;
                            TurnState::Streaming
                        }
                    }
                }

                TurnState::ToolRoundTrip(calls) => {
                    content.push_str(&std::mem::take(&mut buffer));
                    // the tool-call message only enters the history together with
                    // every one of its results
                    let mut round_trip = vec![assistant_tool_calls(
                        std::mem::take(&mut content),
                        calls.iter().cloned().map(Into::into).collect(),
                    )];
                    for call in calls {
                        let result = self
                            .execute(&call.name, Arguments::Json(&call.json), out, cancel)
                            .await?;
                        round_trip.push(tool_message(call.id, result));
                    }
                    for message in round_trip {
                        conversation.push(message);
                    }

                    let mut follow_up = self.open(conversation, cancel).await?;
                    while let Some(event) = self.next_event(&mut follow_up, cancel).await? {
                        match event {
                            StreamEvent::Text(text) => {
                                out.write_all(text.as_bytes()).await?;
                                out.flush().await?;
                                content.push_str(&text);
                            }
                            StreamEvent::ToolCall(call) => {
                                warn!(tool = %call.name, "ignoring tool call in follow-up response");
                            }
                            StreamEvent::Finished(_) => {}
                        }
                    }
                    TurnState::Done
                }

                TurnState::Done => break,
            };
        }

        content.push_str(&buffer);
        if !content.is_empty() {
            conversation.push(assistant_message(content.clone()));
        }
        Ok(content)
    }

    async fn open(
        &self,
        conversation: &Conversation,
        cancel: &CancellationToken,
    ) -> Result<ActiveStream, TurnError> {
        let deadline = Instant::now() + self.settings.request_timeout;
        let request = CompletionRequest {
            model: self.settings.model.clone(),
            messages: conversation.messages().to_vec(),
            tools: self.executor.toolset().openai_chatcompletion_toolset(),
            temperature: self.settings.temperature,
        };
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TurnError::Cancelled),
            opened = tokio::time::timeout_at(deadline, self.source.open_stream(request)) => opened,
        };
        let events = opened.map_err(|_| self.timeout())??;
        Ok(ActiveStream { events, deadline })
    }

    async fn next_event(
        &self,
        stream: &mut ActiveStream,
        cancel: &CancellationToken,
    ) -> Result<Option<StreamEvent>, TurnError> {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TurnError::Cancelled),
            next = tokio::time::timeout_at(stream.deadline, stream.events.next()) => next,
        };
        match next.map_err(|_| self.timeout())? {
            Some(event) => Ok(Some(event?)),
            None => Ok(None),
        }
    }

    async fn execute<W>(
        &self,
        name: &str,
        arguments: Arguments<'_>,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> Result<String, TurnError>
    where
        W: AsyncWrite + Unpin,
    {
        let shown = match arguments {
            Arguments::Inline(args) | Arguments::Json(args) => args,
        };
        out.write_all(format!("\n[{name}({shown})]\n").as_bytes())
            .await?;
        out.flush().await?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TurnError::Cancelled),
            result = self.executor.execute(name, arguments) => Ok(result),
        }
    }

    fn timeout(&self) -> TurnError {
        TurnError::Timeout(self.settings.request_timeout.as_secs())
    }
}
