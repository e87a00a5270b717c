use std::sync::Arc;

use tracing::{debug, info, warn};

use aria_core::files::FileDescriptor;
use aria_core::state::{TurnFlags, TurnInput, TurnReply, TurnState};
use aria_core::validator::MessageValidator;
use aria_graph::{GraphExecutor, NodeRegistry, StateLogSink};
use aria_memory::{ConversationLog, MemoryStore, Sender};
use aria_sessions::SessionTimerManager;

/// Reply surfaced when a turn fails without producing one.
const TURN_APOLOGY: &str =
    "I'm sorry — something went wrong on my end. Could you say that again?";

/// Entry point for one conversation turn.
///
/// Builds the initial state, runs the graph, persists the exchange, arms
/// the inactivity timer, and returns the public fields. Per-turn inputs
/// (text, raw file bytes) travel as an explicit [`TurnInput`] beside the
/// state, so they are never re-serialized by the snapshot sink.
pub struct TurnCoordinator {
    executor: Arc<GraphExecutor>,
    registry: Arc<NodeRegistry>,
    sink: Arc<StateLogSink>,
    memory: Arc<dyn MemoryStore>,
    conv_log: Arc<ConversationLog>,
    timers: Arc<SessionTimerManager>,
}

impl TurnCoordinator {
    pub fn new(
        executor: Arc<GraphExecutor>,
        registry: Arc<NodeRegistry>,
        sink: Arc<StateLogSink>,
        memory: Arc<dyn MemoryStore>,
        conv_log: Arc<ConversationLog>,
        timers: Arc<SessionTimerManager>,
    ) -> Self {
        Self {
            executor,
            registry,
            sink,
            memory,
            conv_log,
            timers,
        }
    }

    /// Handle one user-visible exchange (or a core-initiated reminder when
    /// the flags say so).
    pub async fn handle_turn(
        &self,
        session_id: &str,
        text: &str,
        files: Vec<FileDescriptor>,
        flags: TurnFlags,
    ) -> TurnReply {
        info!(
            session = %session_id,
            auto = flags.is_auto_response,
            reminder = flags.is_inactivity_reminder,
            files = files.len(),
            "handling turn"
        );

        let initial = TurnState::new(self.registry.list_public(), flags);
        let input = TurnInput {
            text: text.to_string(),
            files,
        };
        let final_state = self.executor.run(session_id, initial, &input).await;

        // Last-chance structural check — warn-only at this point, the turn
        // already ran.
        if let Err(e) = MessageValidator::validate_all(&final_state.messages) {
            warn!(session = %session_id, error = %e, "final state failed message validation");
        }

        let mut response = final_state.response.clone();
        if !final_state.success && response.trim().is_empty() {
            response = TURN_APOLOGY.to_string();
        }

        if response.trim().is_empty() {
            debug!(session = %session_id, "empty reply, skipping conversation persistence");
        } else {
            self.persist_turn(session_id, &final_state, &response);
        }

        self.sink.snapshot(session_id, &final_state, "final_state");

        let inactivity_timeout = final_state.inactivity_timeout;
        self.timers.arm(session_id, inactivity_timeout);

        TurnReply {
            response,
            success: final_state.success,
            inactivity_timeout,
        }
    }

    /// Write the user and assistant turns to the conversation log file and
    /// the memory store's transcript table. Failures are diagnostic only.
    fn persist_turn(&self, session_id: &str, state: &TurnState, response: &str) {
        let file_info = state
            .latest_human()
            .and_then(|m| m.extra_str("file_info"))
            .map(str::to_string);
        let attached = attached_files_note(&state.files);

        if let Err(e) = self.conv_log.append(
            session_id,
            Sender::User,
            &state.input_text,
            file_info.as_deref(),
            attached.as_deref(),
        ) {
            warn!(session = %session_id, error = %e, "failed to log user turn");
        }
        if let Err(e) =
            self.memory
                .append_message(session_id, Sender::User, &state.input_text, file_info.as_deref())
        {
            warn!(session = %session_id, error = %e, "failed to store user turn");
        }

        if let Err(e) = self
            .conv_log
            .append(session_id, Sender::Assistant, response, None, None)
        {
            warn!(session = %session_id, error = %e, "failed to log assistant turn");
        }
        if let Err(e) = self
            .memory
            .append_message(session_id, Sender::Assistant, response, None)
        {
            warn!(session = %session_id, error = %e, "failed to store assistant turn");
        }
    }
}

/// `"a.jpg (image), b.png (image): <description of the first file>"`,
/// or `None` when the turn had no files.
fn attached_files_note(files: &[FileDescriptor]) -> Option<String> {
    if files.is_empty() {
        return None;
    }
    let names: Vec<String> = files
        .iter()
        .map(|f| format!("{} ({})", f.filename, f.kind.as_str()))
        .collect();
    let description = files[0]
        .description
        .clone()
        .unwrap_or_else(|| "no description".to_string());
    Some(format!("{}: {}", names.join(", "), description))
}
