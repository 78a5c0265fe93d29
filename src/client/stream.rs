use anyhow::Result;
use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestMessage, ChatCompletionTool,
    ChatCompletionToolChoiceOption, ChatCompletionToolType, CreateChatCompletionRequestArgs,
    CreateChatCompletionStreamResponse, FinishReason, FunctionCall,
};
use async_stream::stream;
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use std::collections::BTreeMap;
use std::pin::Pin;
use tracing::debug;

pub const MISTRAL_API_BASE: &str = "https://api.mistral.ai/v1";

/// A native tool call, reassembled from its streamed fragments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub json: String,
}

impl From<ToolCall> for ChatCompletionMessageToolCall {
    fn from(call: ToolCall) -> Self {
        Self {
            id: call.id,
            r#type: ChatCompletionToolType::Function,
            function: FunctionCall {
                name: call.name,
                arguments: call.json,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Text(String),
    ToolCall(ToolCall),
    Finished(FinishReason),
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatCompletionRequestMessage>,
    pub tools: Vec<ChatCompletionTool>,
    pub temperature: f32,
}

/// Something that can answer a chat completion as a stream of events.
#[async_trait]
pub trait CompletionSource: Send + Sync {
    async fn open_stream(&self, request: CompletionRequest) -> Result<EventStream>;
}

/// OpenAI-compatible chat completions endpoint (Mistral by default).
pub struct OpenAiSource {
    inner: Client<OpenAIConfig>,
}

impl OpenAiSource {
    pub fn new(api_key: &str, api_base: &str) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);
        Self {
            inner: Client::with_config(config),
        }
    }
}

#[async_trait]
impl CompletionSource for OpenAiSource {
    async fn open_stream(&self, request: CompletionRequest) -> Result<EventStream> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            temperature = request.temperature,
            "opening chat completion stream"
        );
        let request = CreateChatCompletionRequestArgs::default()
            .model(request.model)
            .messages(request.messages)
            .tools(request.tools)
            .tool_choice(ChatCompletionToolChoiceOption::Auto)
            .temperature(request.temperature)
            .n(1)
            .build()?;

        let stream = self.inner.chat().create_stream(request).await?;
        Ok(map_stream(stream))
    }
}

/// Turns raw completion chunks into [`StreamEvent`]s.
///
/// Tool-call fragments are merged per call index and released, in index
/// order, when the chunk carrying finish reason `tool_calls` arrives (or when
/// the stream ends with calls still pending).
pub fn map_stream<S>(mut stream: S) -> EventStream
where
    S: Stream<Item = Result<CreateChatCompletionStreamResponse, OpenAIError>>
        + Send
        + Unpin
        + 'static,
{
    Box::pin(stream! {
        let mut tool_calls: BTreeMap<u32, ToolCall> = BTreeMap::new();
        while let Some(part) = stream.next().await {
            let part = match part {
                Ok(part) => part,
                Err(error) => {
                    yield Err(anyhow::Error::from(error));
                    break;
                }
            };
            let Some(first) = part.choices.first() else {
                continue;
            };
            if let Some(content) = &first.delta.content {
                if !content.is_empty() {
                    yield Ok(StreamEvent::Text(content.clone()));
                }
            }
            for call in first.delta.tool_calls.iter().flatten() {
                let partial = tool_calls.entry(call.index).or_default();
                if let Some(id) = &call.id {
                    partial.id.clone_from(id);
                }
                if let Some(function) = &call.function {
                    if let Some(name) = &function.name {
                        partial.name.push_str(name);
                    }
                    if let Some(arguments) = &function.arguments {
                        partial.json.push_str(arguments);
                    }
                }
            }
            if let Some(reason) = &first.finish_reason {
                if matches!(reason, FinishReason::ToolCalls) {
                    for call in std::mem::take(&mut tool_calls).into_values() {
                        yield Ok(StreamEvent::ToolCall(call));
                    }
                }
                yield Ok(StreamEvent::Finished(reason.clone()));
            }
        }
        for call in tool_calls.into_values() {
            yield Ok(StreamEvent::ToolCall(call));
        }
    })
}
