use anyhow::{Result, anyhow};
use async_openai::types::{
    ChatCompletionRequestAssistantMessageContent, ChatCompletionRequestMessage,
    ChatCompletionRequestToolMessageContent, FinishReason,
};
use async_trait::async_trait;
use devchat::client::{
    CompletionRequest, CompletionSource, EventStream, Orchestrator, StreamEvent, ToolCall,
    TurnError, TurnSettings,
};
use devchat::conversation::Conversation;
use devchat::tools::{
    DisabledRunner, Sandbox, ScriptRunner, ToolContext, WikipediaSearch, default_toolset,
};
use devchat::types::ToolExecutor;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Replays canned event streams and records every request it receives.
#[derive(Clone, Default)]
struct ScriptedSource {
    responses: Arc<Mutex<VecDeque<Vec<StreamEvent>>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedSource {
    fn new(responses: Vec<Vec<StreamEvent>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            requests: Arc::default(),
        }
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionSource for ScriptedSource {
    async fn open_stream(&self, request: CompletionRequest) -> Result<EventStream> {
        self.requests.lock().unwrap().push(request);
        let events = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("no more scripted responses"))?;
        Ok(Box::pin(futures::stream::iter(events.into_iter().map(Ok))))
    }
}

fn text(text: &str) -> StreamEvent {
    StreamEvent::Text(text.to_string())
}

fn stop() -> StreamEvent {
    StreamEvent::Finished(FinishReason::Stop)
}

fn orchestrator(
    source: ScriptedSource,
    max_tool_depth: usize,
) -> (TempDir, Orchestrator<ScriptedSource, ToolContext>) {
    let settings = TurnSettings {
        max_tool_depth,
        ..TurnSettings::default()
    };
    build(source, settings, Arc::new(DisabledRunner))
}

fn build<S: CompletionSource>(
    source: S,
    settings: TurnSettings,
    scripts: Arc<dyn ScriptRunner>,
) -> (TempDir, Orchestrator<S, ToolContext>) {
    let dir = TempDir::new().unwrap();
    let context = ToolContext {
        sandbox: Sandbox::new(dir.path().join("sandbox")),
        search: WikipediaSearch::with_endpoint("http://127.0.0.1:9/w/api.php", "tests").unwrap(),
        scripts,
    };
    let executor = ToolExecutor::new(
        Arc::new(default_toolset().unwrap()),
        context,
        Duration::from_secs(5),
    );
    (dir, Orchestrator::new(source, executor, settings))
}

/// A script runner that takes longer than any test is willing to wait.
struct SlowRunner;

#[async_trait]
impl ScriptRunner for SlowRunner {
    async fn run(&self, _: &str) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(2)).await;
        Ok("finished".to_string())
    }
}

/// Sends one text delta, then never produces another event.
struct StallingSource;

#[async_trait]
impl CompletionSource for StallingSource {
    async fn open_stream(&self, _: CompletionRequest) -> Result<EventStream> {
        let first = futures::stream::iter([Ok(text("partial"))]);
        Ok(Box::pin(first.chain(futures::stream::pending())))
    }
}

fn cancel_after(delay: Duration) -> CancellationToken {
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(delay).await;
            cancel.cancel();
        }
    });
    cancel
}

/// Renders each message as `role: text` for compact assertions.
fn transcript(conversation: &Conversation) -> Vec<String> {
    conversation
        .messages()
        .iter()
        .map(|message| match message {
            ChatCompletionRequestMessage::System(_) => "system".to_string(),
            ChatCompletionRequestMessage::User(user) => format!("user: {:?}", user.content),
            ChatCompletionRequestMessage::Assistant(assistant) => {
                let content = match &assistant.content {
                    Some(ChatCompletionRequestAssistantMessageContent::Text(text)) => text.clone(),
                    Some(other) => format!("{other:?}"),
                    None => String::new(),
                };
                match &assistant.tool_calls {
                    Some(calls) => {
                        let ids: Vec<_> = calls.iter().map(|call| call.id.as_str()).collect();
                        format!("assistant: {content} calls={}", ids.join(","))
                    }
                    None => format!("assistant: {content}"),
                }
            }
            ChatCompletionRequestMessage::Tool(tool) => match &tool.content {
                ChatCompletionRequestToolMessageContent::Text(text) => {
                    format!("tool {}: {text}", tool.tool_call_id)
                }
                other => format!("tool {}: {other:?}", tool.tool_call_id),
            },
            other => format!("{other:?}"),
        })
        .collect()
}

async fn run(
    orchestrator: &Orchestrator<ScriptedSource, ToolContext>,
    conversation: &mut Conversation,
    input: &str,
) -> (Result<String, TurnError>, String) {
    let mut out = Vec::new();
    let result = orchestrator
        .run_turn(conversation, input, &mut out, &CancellationToken::new())
        .await;
    (result, String::from_utf8(out).unwrap())
}

#[tokio::test]
async fn plain_answer_is_streamed_and_recorded() {
    let source = ScriptedSource::new(vec![vec![text("Hello"), text(", world"), stop()]]);
    let (_dir, orchestrator) = orchestrator(source.clone(), 8);
    let mut conversation = Conversation::default();

    let (result, printed) = run(&orchestrator, &mut conversation, "hi").await;

    assert_eq!(result.unwrap(), "Hello, world");
    assert_eq!(printed, "Hello, world");
    assert_eq!(transcript(&conversation)[2..], ["assistant: Hello, world"]);

    let requests = source.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].messages.len(), 2);
    assert_eq!(requests[0].tools.len(), 5);
    assert_eq!(requests[0].model, "devstral-small-latest");
}

#[tokio::test]
async fn inline_marker_runs_tool_and_continues() {
    let source = ScriptedSource::new(vec![
        vec![text("Sure: [[calculate_math:2+2]]")],
        vec![text(" The answer is 4."), stop()],
    ]);
    let (_dir, orchestrator) = orchestrator(source.clone(), 8);
    let mut conversation = Conversation::default();

    let (result, printed) = run(&orchestrator, &mut conversation, "what is 2+2?").await;

    assert_eq!(result.unwrap(), " The answer is 4.");
    assert_eq!(
        printed,
        "Sure: [[calculate_math:2+2]]\n[calculate_math(2+2)]\n The answer is 4."
    );
    assert_eq!(
        transcript(&conversation)[2..],
        [
            "assistant: Sure: ",
            "assistant: [calculate_math result: 4]",
            "assistant:  The answer is 4.",
        ]
    );

    let requests = source.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages.len(), 4);
}

#[tokio::test]
async fn marker_split_across_deltas_is_detected() {
    let source = ScriptedSource::new(vec![
        vec![text("[[calcul"), text("ate_math:6*7]]")],
        vec![text("42"), stop()],
    ]);
    let (_dir, orchestrator) = orchestrator(source.clone(), 8);
    let mut conversation = Conversation::default();

    let (result, _) = run(&orchestrator, &mut conversation, "6 times 7").await;

    assert_eq!(result.unwrap(), "42");
    assert!(
        transcript(&conversation).contains(&"assistant: [calculate_math result: 42]".to_string())
    );
    assert_eq!(source.requests().len(), 2);
}

#[tokio::test]
async fn two_markers_in_one_delta_share_one_follow_up() {
    let source = ScriptedSource::new(vec![
        vec![text("[[calculate_math:1+1]] and [[calculate_math:2+2]]")],
        vec![text("done"), stop()],
    ]);
    let (_dir, orchestrator) = orchestrator(source.clone(), 8);
    let mut conversation = Conversation::default();

    let (result, _) = run(&orchestrator, &mut conversation, "two sums").await;

    assert_eq!(result.unwrap(), "done");
    assert_eq!(
        transcript(&conversation)[2..],
        [
            "assistant: ",
            "assistant: [calculate_math result: 2]",
            "assistant:  and ",
            "assistant: [calculate_math result: 4]",
            "assistant: done",
        ]
    );
    assert_eq!(source.requests().len(), 2);
}

#[tokio::test]
async fn unterminated_marker_stays_as_text() {
    let source = ScriptedSource::new(vec![vec![text("look [[calc"), stop()]]);
    let (_dir, orchestrator) = orchestrator(source.clone(), 8);
    let mut conversation = Conversation::default();

    let (result, _) = run(&orchestrator, &mut conversation, "hi").await;

    assert_eq!(result.unwrap(), "look [[calc");
    assert_eq!(source.requests().len(), 1);
}

#[tokio::test]
async fn unknown_inline_tool_reports_error_text() {
    let source = ScriptedSource::new(vec![
        vec![text("[[teleport:mars]]")],
        vec![text("sorry"), stop()],
    ]);
    let (_dir, orchestrator) = orchestrator(source, 8);
    let mut conversation = Conversation::default();

    let (result, _) = run(&orchestrator, &mut conversation, "go").await;

    assert_eq!(result.unwrap(), "sorry");
    assert!(
        transcript(&conversation)
            .contains(&"assistant: [teleport result: Error: Unknown function 'teleport'.]".to_string())
    );
}

#[tokio::test]
async fn native_tool_calls_round_trip_once() {
    let source = ScriptedSource::new(vec![
        vec![
            StreamEvent::ToolCall(ToolCall {
                id: "call_1".into(),
                name: "calculate_math".into(),
                json: r#"{"expression": "6*7"}"#.into(),
            }),
            StreamEvent::ToolCall(ToolCall {
                id: "call_2".into(),
                name: "file_operation".into(),
                json: r#"{"operation": "list", "path": "."}"#.into(),
            }),
            StreamEvent::Finished(FinishReason::ToolCalls),
        ],
        vec![text("It is 42."), stop()],
    ]);
    let (_dir, orchestrator) = orchestrator(source.clone(), 8);
    let mut conversation = Conversation::default();

    let (result, printed) = run(&orchestrator, &mut conversation, "compute").await;

    assert_eq!(result.unwrap(), "It is 42.");
    assert!(printed.contains("[calculate_math({\"expression\": \"6*7\"})]"));
    assert_eq!(
        transcript(&conversation)[2..],
        [
            "assistant:  calls=call_1,call_2",
            "tool call_1: 42",
            "tool call_2: Directory is empty.",
            "assistant: It is 42.",
        ]
    );

    let requests = source.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages.len(), 5);
}

#[tokio::test]
async fn marker_chain_is_bounded() {
    let looping = || vec![text("again [[get_current_time:]]")];
    let source = ScriptedSource::new(vec![looping(), looping(), looping(), looping()]);
    let (_dir, orchestrator) = orchestrator(source.clone(), 2);
    let mut conversation = Conversation::default();

    let (result, _) = run(&orchestrator, &mut conversation, "loop").await;

    assert!(matches!(result, Err(TurnError::ToolDepthExceeded(2))));
    assert_eq!(source.requests().len(), 3);
}

#[tokio::test]
async fn cancelled_turn_stops_before_streaming() {
    let source = ScriptedSource::new(vec![vec![text("never shown"), stop()]]);
    let (_dir, orchestrator) = orchestrator(source, 8);
    let mut conversation = Conversation::default();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut out = Vec::new();
    let result = orchestrator
        .run_turn(&mut conversation, "hi", &mut out, &cancel)
        .await;

    assert!(matches!(result, Err(TurnError::Cancelled)));
    assert!(out.is_empty());
}

#[tokio::test]
async fn source_errors_surface_as_api_errors() {
    let source = ScriptedSource::new(vec![]);
    let (_dir, orchestrator) = orchestrator(source, 8);
    let mut conversation = Conversation::default();

    let (result, _) = run(&orchestrator, &mut conversation, "hi").await;

    let error = result.unwrap_err();
    assert!(matches!(error, TurnError::Api(_)));
    assert_eq!(error.to_string(), "no more scripted responses");
}

#[tokio::test(start_paused = true)]
async fn cancelling_a_native_round_trip_leaves_no_unanswered_tool_calls() {
    let source = ScriptedSource::new(vec![vec![
        StreamEvent::ToolCall(ToolCall {
            id: "call_1".into(),
            name: "run_python_script".into(),
            json: r#"{"code": "result = 1"}"#.into(),
        }),
        StreamEvent::Finished(FinishReason::ToolCalls),
    ]]);
    let (_dir, orchestrator) = build(source, TurnSettings::default(), Arc::new(SlowRunner));
    let mut conversation = Conversation::default();
    let cancel = cancel_after(Duration::from_millis(200));

    let mut out = Vec::new();
    let result = orchestrator
        .run_turn(&mut conversation, "run it", &mut out, &cancel)
        .await;

    assert!(matches!(result, Err(TurnError::Cancelled)));
    assert_eq!(transcript(&conversation)[1..], ["user: Text(\"run it\")"]);

    conversation.truncate(10);
    assert!(
        transcript(&conversation)
            .iter()
            .all(|message| !message.contains("calls="))
    );
}

#[tokio::test(start_paused = true)]
async fn stalled_stream_hits_the_request_deadline() {
    let settings = TurnSettings {
        request_timeout: Duration::from_secs(3),
        ..TurnSettings::default()
    };
    let (_dir, orchestrator) = build(StallingSource, settings, Arc::new(DisabledRunner));
    let mut conversation = Conversation::default();

    let mut out = Vec::new();
    let result = orchestrator
        .run_turn(&mut conversation, "hi", &mut out, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(TurnError::Timeout(3))));
    assert_eq!(out, b"partial");
}

#[tokio::test(start_paused = true)]
async fn cancelling_mid_stream_ends_the_turn() {
    let (_dir, orchestrator) =
        build(StallingSource, TurnSettings::default(), Arc::new(DisabledRunner));
    let mut conversation = Conversation::default();
    let cancel = cancel_after(Duration::from_secs(1));

    let mut out = Vec::new();
    let result = orchestrator
        .run_turn(&mut conversation, "hi", &mut out, &cancel)
        .await;

    assert!(matches!(result, Err(TurnError::Cancelled)));
    assert_eq!(out, b"partial");
    assert_eq!(conversation.len(), 2);
}
