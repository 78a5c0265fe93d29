use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessage,
    ChatCompletionRequestAssistantMessageContent, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestSystemMessageContent,
    ChatCompletionRequestToolMessage, ChatCompletionRequestToolMessageContent,
    ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent,
};

pub const DEFAULT_HISTORY_WINDOW: usize = 10;

pub const SYSTEM_PROMPT: &str = "You are Devstral, a helpful AI assistant created by Mistral. \
You can answer questions, perform web searches, execute Python code, perform calculations, and \
manage files in a safe directory. Provide clear, accurate, and concise responses.
For inline function calls, use the format [[calculate_math:expression]] for calculations \
(e.g., [[calculate_math:1+1]]), [[web_search:query]] for searches, etc. Supported functions are: \
get_current_time, web_search, calculate_math, run_python_script, file_operation. For \
file_operation the arguments are a JSON object with operation, path and optional content. \
After an inline function call, assume the result will be provided and continue your response \
accordingly.
If the user asks you a mathematical question, you MUST use the calculate_math function to \
evaluate it.";

/// Rolling chat history that always starts with the system message.
#[derive(Debug, Clone)]
pub struct Conversation {
    system: ChatCompletionRequestMessage,
    messages: Vec<ChatCompletionRequestMessage>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(SYSTEM_PROMPT)
    }
}

impl Conversation {
    pub fn new(system_prompt: &str) -> Self {
        let system = system_message(system_prompt);
        Self {
            messages: vec![system.clone()],
            system,
        }
    }

    pub fn messages(&self) -> &[ChatCompletionRequestMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Always false: the system message survives `clear` and `truncate`.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: ChatCompletionRequestMessage) {
        self.messages.push(message);
    }

    /// Drops everything but the system message.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.messages.push(self.system.clone());
    }

    /// Keeps at most the last `window` messages, the system message included.
    pub fn truncate(&mut self, window: usize) {
        if self.messages.len() <= window {
            return;
        }
        let keep = window.saturating_sub(1);
        let cut = self.messages.len() - keep;
        let mut tail = self.messages.split_off(cut);
        // tool results whose assistant tool-call message was cut off
        let orphans = tail
            .iter()
            .take_while(|message| matches!(message, ChatCompletionRequestMessage::Tool(_)))
            .count();
        tail.drain(..orphans);
        self.messages.clear();
        self.messages.push(self.system.clone());
        self.messages.append(&mut tail);
    }
}

pub fn system_message(text: &str) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
        content: ChatCompletionRequestSystemMessageContent::Text(text.to_string()),
        name: None,
    })
}

pub fn user_message(text: impl Into<String>) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
        content: ChatCompletionRequestUserMessageContent::Text(text.into()),
        name: None,
    })
}

pub fn assistant_message(text: impl Into<String>) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
        content: Some(ChatCompletionRequestAssistantMessageContent::Text(
            text.into(),
        )),
        ..Default::default()
    })
}

pub fn assistant_tool_calls(
    text: String,
    tool_calls: Vec<ChatCompletionMessageToolCall>,
) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
        content: if text.is_empty() {
            None
        } else {
            Some(ChatCompletionRequestAssistantMessageContent::Text(text))
        },
        tool_calls: if tool_calls.is_empty() {
            None
        } else {
            Some(tool_calls)
        },
        ..Default::default()
    })
}

pub fn tool_message(tool_call_id: String, text: String) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::Tool(ChatCompletionRequestToolMessage {
        content: ChatCompletionRequestToolMessageContent::Text(text),
        tool_call_id,
    })
}
