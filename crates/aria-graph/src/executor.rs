use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{error, info, warn};

use aria_core::message::Message;
use aria_core::state::{TurnInput, TurnState, END_NODE, UNIFIED_NODE};
use aria_core::validator::MessageValidator;

use crate::registry::NodeRegistry;
use crate::statelog::StateLogSink;

/// Retry cap per node invocation site.
pub const MAX_NODE_RETRIES: u32 = 10;

/// Upper bound on node transitions within one turn. The decision node's
/// loop-prevention rule makes this unreachable in practice.
const MAX_TRANSITIONS: u32 = 25;

/// Drives a turn's state through the node graph.
///
/// A plain loop over `state.next_node` with a per-node retry/rollback
/// wrapper. The transcript cache keyed by session id isolates session
/// histories across turns.
pub struct GraphExecutor {
    registry: Arc<NodeRegistry>,
    sink: Arc<StateLogSink>,
    transcripts: Mutex<HashMap<String, Vec<Message>>>,
}

impl GraphExecutor {
    pub fn new(registry: Arc<NodeRegistry>, sink: Arc<StateLogSink>) -> Self {
        Self {
            registry,
            sink,
            transcripts: Mutex::new(HashMap::new()),
        }
    }

    /// Run one turn to completion. Entry is always the unified decision
    /// node; the turn ends when a node routes to the terminator sentinel
    /// (or a node exhausts its retries / fails structurally).
    pub async fn run(
        &self,
        session_id: &str,
        mut state: TurnState,
        input: &TurnInput,
    ) -> TurnState {
        self.seed_transcript(session_id, &mut state);
        state.next_node = UNIFIED_NODE.to_string();

        let mut transitions = 0u32;
        loop {
            let node_name = state.next_node.clone();

            if node_name == END_NODE {
                // The terminator is exempt from the validator+retry wrapper:
                // a pass-through that returns its input with success=true.
                if let Some(handler) = self.registry.handler(END_NODE) {
                    state = handler.run(state, input).await;
                } else {
                    state.success = true;
                }
                break;
            }

            transitions += 1;
            if transitions > MAX_TRANSITIONS {
                error!(session = %session_id, "node transition limit exceeded");
                state.success = false;
                state.error = Some(format!(
                    "turn exceeded {MAX_TRANSITIONS} node transitions"
                ));
                break;
            }

            let Some(handler) = self.registry.handler(&node_name) else {
                warn!(session = %session_id, node = %node_name, "routing to unknown node");
                state.success = false;
                state.error = Some(format!("unknown node '{node_name}'"));
                break;
            };

            // Pre-call snapshot for rollback.
            let pre = state.clone();
            let mut attempt = state;
            let mut retries = 0u32;

            state = loop {
                let started = Instant::now();
                let mut result = handler.run(attempt, input).await;
                let elapsed_ms = started.elapsed().as_millis() as u64;

                // Structural check on everything the node returned. A shape
                // violation is fatal for the turn: discard the result, roll
                // back, no retry.
                if let Err(shape_err) = MessageValidator::validate_all(&result.messages) {
                    warn!(
                        session = %session_id,
                        node = %node_name,
                        error = %shape_err,
                        "node output failed message validation"
                    );
                    let mut rolled_back = pre;
                    rolled_back.success = false;
                    rolled_back.error = Some(shape_err.to_string());
                    return self.finish(session_id, rolled_back);
                }

                if result.success {
                    info!(
                        session = %session_id,
                        node = %node_name,
                        elapsed_ms,
                        "node completed"
                    );
                    self.sink.snapshot(session_id, &result, &node_name);
                    break result;
                }

                // Structural failure inside the node (schema violation):
                // keep the returned state — it carries the user-visible
                // fallback reply — and stop without retrying.
                if result.fatal {
                    warn!(
                        session = %session_id,
                        node = %node_name,
                        error = result.error.as_deref().unwrap_or("unknown"),
                        "node failed fatally, no retry"
                    );
                    self.sink
                        .snapshot(session_id, &result, &format!("{node_name}_failed"));
                    return self.finish(session_id, result);
                }

                retries += 1;
                if retries >= MAX_NODE_RETRIES {
                    error!(
                        session = %session_id,
                        node = %node_name,
                        retries,
                        "node exhausted retries"
                    );
                    let mut failed = pre;
                    failed.success = false;
                    failed.error = result.error.take().or_else(|| {
                        Some(format!("node '{node_name}' failed {MAX_NODE_RETRIES} times"))
                    });
                    self.sink
                        .snapshot(session_id, &failed, &format!("{node_name}_failed"));
                    return self.finish(session_id, failed);
                }

                warn!(
                    session = %session_id,
                    node = %node_name,
                    attempt = retries,
                    max = MAX_NODE_RETRIES,
                    "node failed, retrying from pre-call state"
                );

                // Restore the pre-call snapshot, preserving only the error
                // from the failed attempt.
                let mut next_attempt = pre.clone();
                next_attempt.error = result
                    .error
                    .take()
                    .or_else(|| Some(format!("node '{node_name}' failed")));
                attempt = next_attempt;
            };
        }

        self.finish(session_id, state)
    }

    /// Seed the turn's message list from the session transcript cache.
    fn seed_transcript(&self, session_id: &str, state: &mut TurnState) {
        let cache = self.transcripts.lock().unwrap();
        if let Some(history) = cache.get(session_id) {
            state.messages = history.clone();
        }
    }

    /// Store the final message list back and hand the state to the caller.
    fn finish(&self, session_id: &str, state: TurnState) -> TurnState {
        let mut cache = self.transcripts.lock().unwrap();
        cache.insert(session_id.to_string(), state.messages.clone());
        state
    }
}
