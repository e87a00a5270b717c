use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use aria_channels::{PushChannel, PushEvent, SpeechSynthesizer, VoiceDispatcher};
use aria_core::config::AriaConfig;
use aria_core::files::FileDescriptor;
use aria_core::state::{TurnFlags, TurnReply};
use aria_graph::{GraphExecutor, RegistryBuilder, StateLogSink};
use aria_llm::apilog::ApiLogger;
use aria_llm::{LlmClient, LlmProvider};
use aria_memory::{ConversationLog, MemoryStore};
use aria_sessions::{ReminderFire, SessionTimerManager};

use crate::coordinator::TurnCoordinator;
use crate::error::Result;
use crate::nodes::{EndNode, MemorySearchNode, MockWeatherProvider, UnifiedResponseNode, WeatherNode};

/// External collaborators injected at startup.
pub struct RuntimeDeps {
    pub provider: Arc<dyn LlmProvider>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub push: Arc<dyn PushChannel>,
    pub memory: Arc<dyn MemoryStore>,
}

/// Wires the orchestration core together and owns the reminder delivery
/// loop. This is the surface the transport layer talks to.
pub struct AssistantRuntime {
    coordinator: Arc<TurnCoordinator>,
    timers: Arc<SessionTimerManager>,
    push: Arc<dyn PushChannel>,
    voice: Arc<VoiceDispatcher>,
}

impl AssistantRuntime {
    /// Build the full graph, executor, and session plumbing from config
    /// plus the injected collaborators, and start the reminder loop.
    pub fn build(config: &AriaConfig, deps: RuntimeDeps) -> Result<Arc<Self>> {
        let persona = load_persona(config.agent.persona_path.as_deref());
        let logger = ApiLogger::new(config.paths.api_logs_dir());
        let llm = Arc::new(LlmClient::new(
            Arc::clone(&deps.provider),
            logger,
            config.provider.model.clone(),
        ));

        let mut builder = RegistryBuilder::new();
        builder.register(
            UnifiedResponseNode::node_info(),
            Arc::new(UnifiedResponseNode::new(
                llm,
                Arc::clone(&deps.memory),
                persona,
                config.agent.recent_conversations,
            )),
        )?;
        builder.register(
            WeatherNode::node_info(),
            Arc::new(WeatherNode::new(Arc::new(MockWeatherProvider))),
        )?;
        builder.register(
            MemorySearchNode::node_info(),
            Arc::new(MemorySearchNode::new(Arc::clone(&deps.memory))),
        )?;
        builder.register(EndNode::node_info(), Arc::new(EndNode))?;
        let registry = builder.build();

        let sink = Arc::new(StateLogSink::new(config.paths.sessions_dir()));
        let executor = Arc::new(GraphExecutor::new(Arc::clone(&registry), Arc::clone(&sink)));
        let conv_log = Arc::new(ConversationLog::new(config.paths.sessions_dir()));
        let (timers, fired_rx) = SessionTimerManager::new();

        let coordinator = Arc::new(TurnCoordinator::new(
            executor,
            registry,
            sink,
            Arc::clone(&deps.memory),
            conv_log,
            Arc::clone(&timers),
        ));
        let voice = Arc::new(VoiceDispatcher::new(
            Arc::clone(&deps.synthesizer),
            Arc::clone(&deps.push),
            config.agent.voice_id,
        ));

        Ok(Self::start(coordinator, timers, deps.push, voice, fired_rx))
    }

    /// Assemble from pre-built parts and spawn the reminder delivery loop.
    pub fn start(
        coordinator: Arc<TurnCoordinator>,
        timers: Arc<SessionTimerManager>,
        push: Arc<dyn PushChannel>,
        voice: Arc<VoiceDispatcher>,
        fired_rx: mpsc::Receiver<ReminderFire>,
    ) -> Arc<Self> {
        let runtime = Arc::new(Self {
            coordinator,
            timers,
            push,
            voice,
        });
        let looped = Arc::clone(&runtime);
        tokio::spawn(async move {
            looped.reminder_loop(fired_rx).await;
        });
        runtime
    }

    /// Handle an inbound user turn from the transport. Speech synthesis is
    /// dispatched in the background; the reply returns immediately.
    pub async fn process_turn(
        &self,
        session_id: &str,
        text: &str,
        files: Vec<FileDescriptor>,
    ) -> TurnReply {
        let reply = self
            .coordinator
            .handle_turn(session_id, text, files, TurnFlags::default())
            .await;

        if !reply.response.trim().is_empty() {
            self.voice
                .dispatch_detached(reply.response.clone(), session_id.to_string());
        }
        reply
    }

    /// Transport signal: a client session came online (or re-announced
    /// itself). Binds the transport id, makes the session active, confirms.
    pub async fn on_session_activate(&self, transport_id: &str, client_session_id: &str) {
        self.timers.on_session_activate(transport_id, client_session_id);
        let confirmed = PushEvent::SessionActivated {
            session_id: client_session_id.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        if let Err(e) = self.push.push(&confirmed).await {
            warn!(session = %client_session_id, error = %e, "failed to confirm session activation");
        }
    }

    /// Transport signal: a connection dropped. An unbound transport id is
    /// logged and otherwise ignored — the transport may disconnect clients
    /// that never activated a session.
    pub fn on_disconnect(&self, transport_id: &str) {
        if let Err(e) = self.timers.on_disconnect(transport_id) {
            warn!(transport = %transport_id, error = %e, "disconnect ignored");
        }
    }

    /// The session/timer manager (exposed for transports and tests).
    pub fn timers(&self) -> &Arc<SessionTimerManager> {
        &self.timers
    }

    // -- reminder pipeline --------------------------------------------------

    async fn reminder_loop(&self, mut fired_rx: mpsc::Receiver<ReminderFire>) {
        info!("reminder delivery loop started");
        while let Some(fire) = fired_rx.recv().await {
            self.deliver_reminder(&fire.session_id).await;
        }
        info!("reminder delivery loop stopped");
    }

    /// The active session stayed silent past its timeout: generate a
    /// spontaneous utterance, push it on the reminder channel, and speak it.
    async fn deliver_reminder(&self, session_id: &str) {
        let reply = self
            .coordinator
            .handle_turn(
                session_id,
                "",
                Vec::new(),
                TurnFlags {
                    is_auto_response: true,
                    is_inactivity_reminder: true,
                },
            )
            .await;

        if reply.response.trim().is_empty() {
            warn!(session = %session_id, "reminder turn produced no reply, nothing to deliver");
            return;
        }

        let event = PushEvent::InactivityReminder {
            response: reply.response.clone(),
            session_id: session_id.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        if let Err(e) = self.push.push(&event).await {
            warn!(session = %session_id, error = %e, "failed to push inactivity reminder");
            return;
        }

        if let Err(e) = self.voice.dispatch(&reply.response, session_id).await {
            warn!(session = %session_id, error = %e, "failed to synthesize reminder");
        }
    }
}

fn load_persona(path: Option<&str>) -> String {
    path.and_then(|p| {
        std::fs::read_to_string(p)
            .map_err(|e| warn!(path = p, error = %e, "failed to load persona file"))
            .ok()
    })
    .unwrap_or_else(default_persona)
}

fn default_persona() -> String {
    "You are Aria, a warm and attentive voice companion. Stay in character, speak \
     casually, and keep replies short enough to be spoken aloud. Adapt to the \
     user's language."
        .to_string()
}
