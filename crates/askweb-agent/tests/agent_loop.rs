//! Agent loop behavior with scripted model and search stubs.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use askweb_agent::{AgentError, AgentErrorKind, AgentLoop, AgentOptions, prompt};
use askweb_core::conversation::Conversation;
use askweb_core::types::{Role, ToolCall};
use askweb_providers::{AssistantTurn, CompletionRequest, ModelClient, ProviderError};
use askweb_tools::web_search::SEARCH_APOLOGY;
use askweb_tools::{SearchBackend, SearchHit, ToolRegistry};

// --- Stubs ---

/// Replays scripted turns in order; repeats the last one when exhausted.
struct ScriptedModel {
    turns: Vec<AssistantTurn>,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    fn new(turns: Vec<AssistantTurn>) -> Arc<Self> {
        Arc::new(Self {
            turns,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        _cancel: &CancellationToken,
    ) -> Result<AssistantTurn, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let idx = n.min(self.turns.len() - 1);
        Ok(self.turns[idx].clone())
    }
}

/// Never answers until cancelled.
struct BlockingModel;

#[async_trait]
impl ModelClient for BlockingModel {
    fn id(&self) -> &str {
        "blocking"
    }

    async fn complete(
        &self,
        _request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<AssistantTurn, ProviderError> {
        cancel.cancelled().await;
        Err(ProviderError::Cancelled)
    }
}

struct StubSearch {
    result: Result<Vec<String>, String>,
    queries: Mutex<Vec<String>>,
    delay: Duration,
}

impl StubSearch {
    fn ok(contents: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(contents.iter().map(|c| c.to_string()).collect()),
            queries: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            result: Err("search provider down".into()),
            queries: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(vec!["late".into()]),
            queries: Mutex::new(Vec::new()),
            delay,
        })
    }

    fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchBackend for StubSearch {
    fn id(&self) -> &str {
        "stub"
    }

    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchHit>> {
        self.queries.lock().unwrap().push(query.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.result {
            Ok(contents) => Ok(contents
                .iter()
                .map(|c| SearchHit {
                    title: String::new(),
                    url: String::new(),
                    content: c.clone(),
                })
                .collect()),
            Err(e) => Err(anyhow::anyhow!("{e}")),
        }
    }
}

// --- Helpers ---

fn search_call(id: &str, query: &str) -> ToolCall {
    ToolCall {
        id: id.into(),
        name: "webSearch".into(),
        arguments: serde_json::json!({ "query": query }).to_string(),
    }
}

fn tool_turn(calls: Vec<ToolCall>) -> AssistantTurn {
    AssistantTurn::from_parts(None, calls)
}

fn answer(text: &str) -> AssistantTurn {
    AssistantTurn::Answer {
        content: text.into(),
    }
}

fn agent_with(model: Arc<dyn ModelClient>, search: Arc<StubSearch>, options: AgentOptions) -> AgentLoop {
    AgentLoop::new(model, Arc::new(ToolRegistry::with_web_search(search)), options)
}

fn conversation() -> Conversation {
    Conversation::new("You are a smart personal assistant.", "What is the current weather in Mumbai?")
}

// --- Tests ---

#[tokio::test]
async fn test_final_answer_is_returned_verbatim() {
    let model = ScriptedModel::new(vec![answer("  exact text, untouched\n")]);
    let agent = agent_with(model.clone(), StubSearch::ok(&[]), AgentOptions::default());
    let mut conv = conversation();

    let outcome = agent.run(&mut conv, &CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.answer, "  exact text, untouched\n");
    assert_eq!(outcome.iterations, 1);
    assert_eq!(model.calls(), 1);
    assert_eq!(conv.len(), 3);
}

#[tokio::test]
async fn test_requests_use_zero_temperature_and_auto_tools() {
    let model = ScriptedModel::new(vec![answer("ok")]);
    let agent = agent_with(model.clone(), StubSearch::ok(&[]), AgentOptions::default());
    agent
        .run(&mut conversation(), &CancellationToken::new())
        .await
        .unwrap();

    let requests = model.requests.lock().unwrap();
    assert_eq!(requests[0].temperature, 0.0);
    assert_eq!(requests[0].tool_choice.as_str(), "auto");
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[0].tools[0].name, "webSearch");
    assert_eq!(requests[0].model, "llama-3.1-8b-instant");
}

#[tokio::test]
async fn test_n_tool_calls_append_n_results_in_order() {
    let model = ScriptedModel::new(vec![
        tool_turn(vec![
            search_call("call_3", "third"),
            search_call("call_1", "first"),
            search_call("call_2", "second"),
        ]),
        answer("summary"),
    ]);
    let search = StubSearch::ok(&["result"]);
    let agent = agent_with(model.clone(), search.clone(), AgentOptions::default());
    let mut conv = conversation();

    let outcome = agent.run(&mut conv, &CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.tool_calls, 3);
    assert_eq!(search.queries(), vec!["third", "first", "second"]);

    let appended = conv.appended();
    assert_eq!(appended.len(), 5);
    assert_eq!(appended[0].role, Role::Assistant);
    assert_eq!(appended[0].tool_calls.len(), 3);
    let ids: Vec<_> = appended[1..4]
        .iter()
        .map(|m| {
            assert_eq!(m.role, Role::Tool);
            m.tool_call_id.as_deref().unwrap()
        })
        .collect();
    assert_eq!(ids, vec!["call_3", "call_1", "call_2"]);
    assert!(conv.validate().is_ok());

    // The second request carried the tool results.
    let requests = model.requests.lock().unwrap();
    assert_eq!(requests[1].messages.len(), 6);
}

#[tokio::test]
async fn test_search_failure_is_absorbed_and_loop_continues() {
    let model = ScriptedModel::new(vec![
        tool_turn(vec![search_call("call_1", "news")]),
        answer("I could not search, sorry."),
    ]);
    let agent = agent_with(model.clone(), StubSearch::failing(), AgentOptions::default());
    let mut conv = conversation();

    let outcome = agent.run(&mut conv, &CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.answer, "I could not search, sorry.");
    assert_eq!(model.calls(), 2);
    assert_eq!(conv.appended()[1].content.as_deref(), Some(SEARCH_APOLOGY));
}

#[tokio::test]
async fn test_identical_input_yields_identical_runs() {
    let script = vec![
        tool_turn(vec![search_call("call_1", "Mumbai weather")]),
        answer("Sunny."),
    ];

    let mut first = conversation();
    let agent = agent_with(ScriptedModel::new(script.clone()), StubSearch::ok(&["Sunny, 31°C"]), AgentOptions::default());
    let a = agent.run(&mut first, &CancellationToken::new()).await.unwrap();

    let mut second = conversation();
    let agent = agent_with(ScriptedModel::new(script), StubSearch::ok(&["Sunny, 31°C"]), AgentOptions::default());
    let b = agent.run(&mut second, &CancellationToken::new()).await.unwrap();

    assert_eq!(a.answer, b.answer);
    assert_eq!(first.appended(), second.appended());
}

#[tokio::test]
async fn test_iteration_cap() {
    let model = ScriptedModel::new(vec![tool_turn(vec![search_call("call", "again")])]);
    let options = AgentOptions {
        max_iterations: 4,
        ..AgentOptions::default()
    };
    let agent = agent_with(model.clone(), StubSearch::ok(&["more"]), options);

    let err = agent
        .run(&mut conversation(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, AgentError::IterationLimit(4));
    assert_eq!(err.kind(), AgentErrorKind::IterationLimit);
    assert_eq!(model.calls(), 4);
}

#[tokio::test]
async fn test_malformed_arguments_fail_the_request() {
    let bad = ToolCall {
        id: "call_1".into(),
        name: "webSearch".into(),
        arguments: "{\"query\": ".into(),
    };
    let model = ScriptedModel::new(vec![tool_turn(vec![bad])]);
    let search = StubSearch::ok(&["x"]);
    let agent = agent_with(model, search.clone(), AgentOptions::default());

    let err = agent
        .run(&mut conversation(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), AgentErrorKind::InvalidToolCall);
    assert!(search.queries().is_empty());
}

#[tokio::test]
async fn test_unknown_tool_fails_before_any_execution() {
    let unknown = ToolCall {
        id: "call_2".into(),
        name: "readFile".into(),
        arguments: "{}".into(),
    };
    let model = ScriptedModel::new(vec![tool_turn(vec![search_call("call_1", "q"), unknown])]);
    let search = StubSearch::ok(&["x"]);
    let agent = agent_with(model, search.clone(), AgentOptions::default());

    let err = agent
        .run(&mut conversation(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), AgentErrorKind::InvalidToolCall);
    assert!(search.queries().is_empty());
}

#[tokio::test]
async fn test_cancelled_before_start_appends_nothing() {
    let model = ScriptedModel::new(vec![answer("never")]);
    let agent = agent_with(model.clone(), StubSearch::ok(&[]), AgentOptions::default());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut conv = conversation();

    let err = agent.run(&mut conv, &cancel).await.unwrap_err();

    assert_eq!(err, AgentError::Cancelled);
    assert_eq!(model.calls(), 0);
    assert_eq!(conv, conversation());
}

#[tokio::test]
async fn test_cancel_during_model_call_appends_nothing() {
    let agent = agent_with(Arc::new(BlockingModel), StubSearch::ok(&[]), AgentOptions::default());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });
    let mut conv = conversation();

    let err = agent.run(&mut conv, &cancel).await.unwrap_err();

    assert_eq!(err.kind(), AgentErrorKind::Aborted);
    assert_eq!(conv.len(), 2);
}

#[tokio::test]
async fn test_cancel_during_search_skips_tool_message() {
    let model = ScriptedModel::new(vec![
        tool_turn(vec![search_call("call_1", "slow")]),
        answer("unreachable"),
    ]);
    let agent = agent_with(model.clone(), StubSearch::slow(Duration::from_secs(10)), AgentOptions::default());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let mut conv = conversation();

    let err = agent.run(&mut conv, &cancel).await.unwrap_err();

    assert_eq!(err, AgentError::Cancelled);
    assert_eq!(model.calls(), 1);
    // Only the completed assistant turn was recorded.
    assert_eq!(conv.appended().len(), 1);
    assert!(conv.appended().iter().all(|m| m.role != Role::Tool));
}

#[tokio::test]
async fn test_request_deadline() {
    let options = AgentOptions {
        request_deadline: Duration::from_millis(50),
        tool_timeout: Duration::from_secs(10),
        ..AgentOptions::default()
    };
    let model = ScriptedModel::new(vec![tool_turn(vec![search_call("call_1", "slow")])]);
    let agent = agent_with(model, StubSearch::slow(Duration::from_secs(10)), options);

    let err = agent
        .run(&mut conversation(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), AgentErrorKind::DeadlineExceeded);
}

#[tokio::test]
async fn test_mumbai_weather_end_to_end() {
    let model = ScriptedModel::new(vec![
        tool_turn(vec![search_call("call_1", "Mumbai weather")]),
        answer("It's sunny, 31°C in Mumbai."),
    ]);
    let search = StubSearch::ok(&["Sunny, 31°C"]);
    let agent = agent_with(model, search.clone(), AgentOptions::default());
    let mut conv = prompt::initial_conversation(
        "What is the current weather in Mumbai?",
        agent.tools(),
        chrono::Utc::now(),
    );

    let outcome = agent.run(&mut conv, &CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.answer, "It's sunny, 31°C in Mumbai.");
    assert_eq!(outcome.iterations, 2);
    assert_eq!(search.queries(), vec!["Mumbai weather"]);
    assert_eq!(conv.appended()[1].content.as_deref(), Some("Sunny, 31°C"));
}
