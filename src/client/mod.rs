pub mod cli;
pub mod orchestrator;
pub mod stream;

pub use orchestrator::{Orchestrator, TurnError, TurnSettings};
pub use stream::{CompletionRequest, CompletionSource, EventStream, OpenAiSource, StreamEvent, ToolCall};
