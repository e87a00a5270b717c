use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use aria_core::state::{NodeInfo, TurnInput, TurnState, DECISION_NODE_SYNONYMS, END_NODE};

use crate::error::{GraphError, Result};

/// A graph node. Handlers receive the current state plus the per-turn input
/// (text and raw files travel outside the state so they are never
/// re-serialized by the snapshot sink) and return the updated state.
///
/// Handlers signal failure by returning `success = false` with an `error`
/// set; external-call failures must be absorbed into that contract rather
/// than bubbling out of the graph.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn run(&self, state: TurnState, input: &TurnInput) -> TurnState;
}

struct RegisteredNode {
    info: NodeInfo,
    handler: Arc<dyn NodeHandler>,
}

/// Builds the process-wide node catalog during initialization.
#[derive(Default)]
pub struct RegistryBuilder {
    nodes: BTreeMap<String, RegisteredNode>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a handler under `info.name`. Re-registration is an error.
    pub fn register(&mut self, info: NodeInfo, handler: Arc<dyn NodeHandler>) -> Result<()> {
        let name = info.name.clone();
        if self.nodes.contains_key(&name) {
            return Err(GraphError::DuplicateNode { name });
        }
        info!(node = %name, "registering graph node");
        self.nodes.insert(name, RegisteredNode { info, handler });
        Ok(())
    }

    /// Freeze the catalog. The registry is read-only from here on.
    pub fn build(self) -> Arc<NodeRegistry> {
        Arc::new(NodeRegistry { nodes: self.nodes })
    }
}

/// Read-only node catalog shared by the executor and the turn coordinator.
pub struct NodeRegistry {
    nodes: BTreeMap<String, RegisteredNode>,
}

impl NodeRegistry {
    pub fn handler(&self, name: &str) -> Option<Arc<dyn NodeHandler>> {
        self.nodes.get(name).map(|n| Arc::clone(&n.handler))
    }

    pub fn info(&self, name: &str) -> Option<&NodeInfo> {
        self.nodes.get(name).map(|n| &n.info)
    }

    /// True when `name` may be offered to the decision node as a tool.
    pub fn is_public(name: &str) -> bool {
        name != END_NODE && !DECISION_NODE_SYNONYMS.contains(&name)
    }

    /// The tool catalog the decision node may route to: every registered
    /// node except the decision node itself (and its synonyms) and the
    /// terminator, so the decision node can never choose itself.
    pub fn list_public(&self) -> BTreeMap<String, NodeInfo> {
        self.nodes
            .iter()
            .filter(|(name, _)| Self::is_public(name))
            .map(|(name, node)| (name.clone(), node.info.clone()))
            .collect()
    }
}
