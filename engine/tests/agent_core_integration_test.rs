//! Integration tests for the Agent Core Loop
//!
//! Validates the loop's limits and behavior:
//! - Final plans end the run without running anything
//! - Max iterations limit and the forced summary call
//! - Screenshot paths attached to the reply exactly once
//! - Planner errors abort the run
//! - Planner replies over HTTP via the OpenAI-compatible provider

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use sdk::types::CommandResult;
use sidekick_engine::agent::{AgentLoop, Planner, MAX_ITERATIONS_REPLY};
use sidekick_engine::command_executor::CommandExecutor;
use sidekick_engine::config::{ExecutionSettings, LLMConfig, SettingsSource};
use sidekick_engine::llm::openai::OpenAIProvider;
use sidekick_engine::llm::{LLMError, LLMProvider, Message, MessageRole};
use sidekick_engine::tools::{ActionDispatcher, ActionRunner, Desktop, PointerAction, ToolCall};

/// Replays canned completions and records every conversation it was shown.
struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, LLMError>>>,
    fallback: Option<String>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    fn new(replies: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.to_string())).collect()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn repeating(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Some(reply.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn failing(error: LLMError) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::from([Err(error)])),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, LLMError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            return reply;
        }
        match &self.fallback {
            Some(reply) => Ok(reply.clone()),
            None => Err(LLMError::ParseError("script exhausted".to_string())),
        }
    }
}

/// Records requested actions and reports them as successful.
#[derive(Default)]
struct RecordingRunner {
    commands: Mutex<Vec<String>>,
}

#[async_trait]
impl ActionRunner for RecordingRunner {
    async fn run(
        &self,
        command: &str,
        _tool: Option<&ToolCall>,
        _settings: &ExecutionSettings,
    ) -> CommandResult {
        self.commands.lock().unwrap().push(command.to_string());
        CommandResult::success(command, "ok")
    }
}

/// Desktop whose screen capture writes a tiny PNG stub.
struct FakeDesktop;

#[async_trait]
impl Desktop for FakeDesktop {
    async fn capture_screen(&self, path: &Path) -> Result<()> {
        tokio::fs::write(path, b"\x89PNG\r\n\x1a\n").await?;
        Ok(())
    }

    async fn pointer(&self, _x: f64, _y: f64, _action: PointerAction) -> Result<()> {
        Ok(())
    }

    async fn type_text(&self, _text: &str) -> Result<()> {
        Ok(())
    }

    async fn open_url(&self, _url: &str) -> Result<()> {
        Ok(())
    }

    async fn open_app(&self, _app: &str) -> Result<()> {
        Ok(())
    }
}

fn settings(max_iterations: u32) -> SettingsSource {
    SettingsSource::Fixed(ExecutionSettings {
        max_iterations,
        ..ExecutionSettings::default()
    })
}

fn agent(provider: Arc<dyn LLMProvider>, runner: Arc<dyn ActionRunner>, max: u32) -> AgentLoop {
    let planner = Planner::new(provider, Path::new("/tmp"), Duration::from_secs(5));
    AgentLoop::new(planner, runner, settings(max))
}

#[tokio::test]
async fn test_final_plan_returns_without_action() {
    let provider =
        ScriptedProvider::new(vec![r#"{"command":"","tool":null,"reply":"Hello!","done":true}"#]);
    let runner = Arc::new(RecordingRunner::default());

    let response = agent(provider.clone(), runner.clone(), 10)
        .run("hi", None)
        .await
        .unwrap();

    assert_eq!(response.reply, "Hello!");
    assert!(response.files.is_empty());
    assert!(runner.commands.lock().unwrap().is_empty());
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_context_and_observations_reach_planner() {
    let provider = ScriptedProvider::new(vec![
        r#"{"command":"df -h","reasoning":"check disk","done":false}"#,
        r#"{"reply":"Plenty of space","done":true}"#,
    ]);
    let runner = Arc::new(RecordingRunner::default());

    let response = agent(provider.clone(), runner.clone(), 10)
        .run("check disk space", Some("earlier answer"))
        .await
        .unwrap();
    assert_eq!(response.reply, "Plenty of space");
    assert_eq!(*runner.commands.lock().unwrap(), vec!["df -h"]);

    let calls = provider.calls.lock().unwrap();
    let first = &calls[0];
    assert_eq!(first[0].role, MessageRole::System);
    assert_eq!(first[1].content, "Previous task context:\nearlier answer");
    assert_eq!(first[2].content, "check disk space");

    let second = &calls[1];
    let last = second.last().unwrap();
    assert_eq!(last.role, MessageRole::User);
    assert_eq!(last.content, "Command result:\n✓ df -h\nok");
    assert_eq!(second[second.len() - 2].role, MessageRole::Assistant);
}

#[tokio::test]
async fn test_max_iterations_forces_summary() {
    let provider = ScriptedProvider::repeating(r#"{"command":"echo loop","done":false}"#);
    let runner = Arc::new(RecordingRunner::default());

    let response = agent(provider.clone(), runner.clone(), 3)
        .run("never finish", None)
        .await
        .unwrap();

    // Three planning calls plus the summary
    assert_eq!(provider.call_count(), 4);
    assert_eq!(runner.commands.lock().unwrap().len(), 3);
    assert_eq!(response.reply, MAX_ITERATIONS_REPLY);

    let calls = provider.calls.lock().unwrap();
    let summary_request = calls.last().unwrap().last().unwrap();
    assert!(summary_request.content.starts_with("Max iterations reached."));
}

#[tokio::test]
async fn test_screenshot_attached_once() {
    let dir = TempDir::new().unwrap();
    let shots = dir.path().join("screenshots");
    let expected = shots.join("screen.png").to_string_lossy().into_owned();

    let final_plan = json!({
        "reply": "Here is your screen",
        "files": [expected.clone()],
        "done": true
    })
    .to_string();
    let provider = ScriptedProvider::new(vec![
        r#"{"tool":{"tool":"screenshot","params":{"filename":"screen.png"}},"done":false}"#,
        final_plan.as_str(),
    ]);
    let dispatcher = Arc::new(ActionDispatcher::new(
        CommandExecutor::new(dir.path()),
        Arc::new(FakeDesktop),
        &shots,
    ));

    let response = agent(provider, dispatcher, 5)
        .run("show me the screen", None)
        .await
        .unwrap();

    assert_eq!(response.reply, "Here is your screen");
    assert_eq!(response.files, vec![expected.clone()]);
    assert!(Path::new(&expected).exists());
}

#[tokio::test]
async fn test_planner_error_aborts_run() {
    let provider = ScriptedProvider::failing(LLMError::AuthenticationFailed("bad key".into()));
    let runner = Arc::new(RecordingRunner::default());

    let err = agent(provider, runner.clone(), 5)
        .run("anything", None)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<LLMError>(),
        Some(LLMError::AuthenticationFailed(_))
    ));
    assert!(runner.commands.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_plan_without_action_ends_run_when_not_done() {
    let provider = ScriptedProvider::new(vec![
        r#"{"command":"","tool":null,"reply":"Nothing to run.","done":false}"#,
        r#"{"command":"echo unreachable","done":false}"#,
    ]);
    let runner = Arc::new(RecordingRunner::default());

    let response = agent(provider.clone(), runner.clone(), 10)
        .run("anything to do?", None)
        .await
        .unwrap();

    assert_eq!(response.reply, "Nothing to run.");
    assert_eq!(provider.call_count(), 1);
    assert!(runner.commands.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_prose_with_object_keeps_reply() {
    let text = r#"Your settings look like {"theme": "dark"} so nothing to change."#;
    let provider = ScriptedProvider::new(vec![text]);
    let runner = Arc::new(RecordingRunner::default());

    let response = agent(provider.clone(), runner.clone(), 5)
        .run("check my settings", None)
        .await
        .unwrap();

    assert_eq!(response.reply, text);
    assert_eq!(provider.call_count(), 1);
    assert!(runner.commands.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_plain_text_reply_is_final() {
    let provider = ScriptedProvider::new(vec!["Sure, your disk is fine."]);
    let runner = Arc::new(RecordingRunner::default());

    let response = agent(provider, runner.clone(), 5)
        .run("how is my disk", None)
        .await
        .unwrap();

    assert_eq!(response.reply, "Sure, your disk is fine.");
    assert!(runner.commands.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_openai_provider_drives_loop() {
    let mock_server = MockServer::start().await;

    let completion = json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": "{\"command\":\"\",\"tool\":null,\"reply\":\"Hello!\",\"done\":true}"
            }
        }]
    });

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = LLMConfig {
        base_url: mock_server.uri(),
        ..LLMConfig::default()
    };
    let provider = Arc::new(OpenAIProvider::new(config, "sk-test").unwrap());
    let runner = Arc::new(RecordingRunner::default());

    let response = agent(provider, runner, 5).run("hi", None).await.unwrap();
    assert_eq!(response.reply, "Hello!");
}

#[tokio::test]
async fn test_openai_provider_error_mapping() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&mock_server)
        .await;

    let config = LLMConfig {
        base_url: mock_server.uri(),
        ..LLMConfig::default()
    };
    let provider = OpenAIProvider::new(config, "sk-test").unwrap();

    let err = provider
        .complete(&[Message::user("hi")])
        .await
        .unwrap_err();
    assert!(matches!(err, LLMError::RateLimitExceeded));
}
