#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use aria_agent::{AssistantRuntime, RuntimeDeps};
use aria_channels::{ChannelError, PushChannel, PushEvent, SpeechSynthesizer, SynthesizedFragment};
use aria_core::config::AriaConfig;
use aria_llm::{ChatRequest, LlmProvider, ProviderError};
use aria_memory::SqliteMemoryStore;

/// LLM provider that replays canned raw responses and records every request.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<String>>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// All system-message contents of the `n`-th recorded request, joined.
    pub fn system_text(&self, n: usize) -> String {
        let requests = self.requests.lock().unwrap();
        requests[n]
            .messages
            .iter()
            .filter(|m| m.role == aria_llm::Role::System)
            .filter_map(|m| m.content.as_str().map(str::to_string))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, req: &ChatRequest) -> Result<String, ProviderError> {
        self.requests.lock().unwrap().push(req.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::Unavailable("script exhausted".to_string()))
    }
}

/// Push channel that records every event it is asked to deliver.
pub struct RecordingPush {
    events: Mutex<Vec<PushEvent>>,
}

impl RecordingPush {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<PushEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn reminders(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PushEvent::InactivityReminder {
                    response,
                    session_id,
                    ..
                } => Some((session_id, response)),
                _ => None,
            })
            .collect()
    }

    pub fn voice_files(&self) -> Vec<(usize, bool, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PushEvent::VoiceFileReady {
                    index,
                    is_last,
                    target_session_id,
                    ..
                } => Some((index, is_last, target_session_id)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl PushChannel for RecordingPush {
    fn name(&self) -> &str {
        "recording"
    }

    async fn push(&self, event: &PushEvent) -> Result<(), ChannelError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Synthesizer that returns a fragment immediately.
pub struct InstantSynth {
    counter: AtomicUsize,
}

impl InstantSynth {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            counter: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for InstantSynth {
    async fn synthesize(
        &self,
        _text: &str,
        _voice_id: u32,
    ) -> Result<SynthesizedFragment, ChannelError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(SynthesizedFragment {
            file_path: format!("/tmp/aria-voice/fragment_{n}.wav"),
        })
    }
}

/// A canned decision-node reply wrapped the way the model is told to answer.
pub fn decision_json(
    requires_tool: bool,
    tool_name: Option<&str>,
    response: &str,
    inactivity_timeout: i64,
) -> String {
    let tool = match tool_name {
        Some(name) => format!("\"{name}\""),
        None => "null".to_string(),
    };
    format!(
        "```json\n{{\n  \"input_processing\": {{\n    \"file_content_description\": \"no files\",\n    \"combined_understanding\": \"plain conversational turn\"\n  }},\n  \"planning\": {{\n    \"requires_tool\": {requires_tool},\n    \"tool_name\": {tool},\n    \"reasoning\": \"scripted decision\"\n  }},\n  \"response\": \"{response}\",\n  \"inactivity_timeout\": {inactivity_timeout}\n}}\n```"
    )
}

pub struct TestHarness {
    pub runtime: Arc<AssistantRuntime>,
    pub provider: Arc<ScriptedProvider>,
    pub push: Arc<RecordingPush>,
    pub memory: Arc<SqliteMemoryStore>,
}

/// Build a full runtime over scripted collaborators, rooted at `data_dir`.
/// Run with RUST_LOG=debug to watch the graph execute.
pub fn build_harness(canned: Vec<String>, data_dir: &Path) -> TestHarness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let provider = ScriptedProvider::new(canned);
    let push = RecordingPush::new();
    let memory = Arc::new(SqliteMemoryStore::in_memory().expect("memory store"));

    let mut config = AriaConfig::default();
    config.paths.data_dir = data_dir.to_string_lossy().to_string();

    let runtime = AssistantRuntime::build(
        &config,
        RuntimeDeps {
            provider: provider.clone(),
            synthesizer: InstantSynth::new(),
            push: push.clone(),
            memory: memory.clone(),
        },
    )
    .expect("runtime");

    TestHarness {
        runtime,
        provider,
        push,
        memory,
    }
}
