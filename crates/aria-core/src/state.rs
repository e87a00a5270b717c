use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_INACTIVITY_TIMEOUT_SECS;
use crate::files::FileDescriptor;
use crate::message::{Message, MessageKind};

/// Entry node of every turn; also the only LLM-backed node.
pub const UNIFIED_NODE: &str = "unified_response";
/// Weather lookup tool node.
pub const WEATHER_NODE: &str = "weather_search";
/// Past-conversation search tool node.
pub const MEMORY_SEARCH_NODE: &str = "memory_search";
/// Terminator sentinel — routing here ends the turn.
pub const END_NODE: &str = "end";

/// Node names the public catalog must never offer as tools: the decision
/// node itself and the single-purpose nodes it absorbed.
pub const DECISION_NODE_SYNONYMS: [&str; 4] = [UNIFIED_NODE, "input", "planner", "output"];

/// Catalog entry describing a node's contract. Handlers are registered
/// separately, so this type is freely serializable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    pub description: String,
    pub capabilities: Vec<String>,
    pub input_requirements: Vec<String>,
    pub output_fields: Vec<String>,
}

/// Per-turn inputs passed explicitly alongside the state.
///
/// Raw file bytes travel here (not on the state) so they are never
/// re-serialized by the snapshot sink; the decision node copies bytes-free
/// descriptors onto the state.
#[derive(Debug, Clone, Default)]
pub struct TurnInput {
    pub text: String,
    pub files: Vec<FileDescriptor>,
}

/// Mode flags for a turn.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnFlags {
    pub is_auto_response: bool,
    pub is_inactivity_reminder: bool,
}

/// Public result of a completed turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnReply {
    pub response: String,
    pub success: bool,
    /// Seconds until a reminder should fire; -1 means "do not arm".
    pub inactivity_timeout: i64,
}

/// The unit of work the graph executor moves between nodes.
///
/// Created by the turn coordinator, mutated only by node handlers under the
/// executor's control, and discarded once the final snapshot is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnState {
    pub input_text: String,
    /// Bytes-free after the decision node runs.
    pub files: Vec<FileDescriptor>,
    /// Natural-language unified understanding of input + files.
    pub processed_input: String,
    /// Append-only within a turn; seeded from the session transcript.
    pub messages: Vec<Message>,
    pub available_nodes: BTreeMap<String, NodeInfo>,
    /// Routing decision; `end` terminates.
    pub next_node: String,
    /// Final reply, populated by a user-facing terminal node.
    pub response: String,
    /// Seconds before a reminder; -1 = do not arm.
    pub inactivity_timeout: i64,
    pub is_auto_response: bool,
    pub is_inactivity_reminder: bool,
    pub success: bool,
    /// Set with `success=false` for structural failures that must not be
    /// retried (the node's returned state, apology included, is kept).
    pub fatal: bool,
    pub error: Option<String>,
}

impl TurnState {
    pub fn new(available_nodes: BTreeMap<String, NodeInfo>, flags: TurnFlags) -> Self {
        Self {
            input_text: String::new(),
            files: Vec::new(),
            processed_input: String::new(),
            messages: Vec::new(),
            available_nodes,
            next_node: UNIFIED_NODE.to_string(),
            response: String::new(),
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT_SECS,
            is_auto_response: flags.is_auto_response,
            is_inactivity_reminder: flags.is_inactivity_reminder,
            success: false,
            fatal: false,
            error: None,
        }
    }

    /// The most recent human message, if any.
    pub fn latest_human(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.kind == MessageKind::Human)
    }

    /// Name of the tool that produced the most recent transcript message.
    ///
    /// Covers both the tool result itself and the routing system message
    /// that carries an `action` extra. Empty history yields `None`.
    pub fn last_tool_name(&self) -> Option<String> {
        let last = self.messages.last()?;
        match last.kind {
            MessageKind::Tool => last.tool_name.clone(),
            MessageKind::System => last.extra_str("action").map(str::to_string),
            _ => None,
        }
    }

    /// True when the transcript ends with a tool result (the turn is
    /// continuing a tool round-trip rather than starting a new user turn).
    pub fn continuing_tool_round_trip(&self) -> bool {
        self.messages
            .last()
            .is_some_and(|m| m.kind == MessageKind::Tool)
    }
}
