use async_trait::async_trait;

use aria_core::state::{NodeInfo, TurnInput, TurnState, END_NODE};
use aria_graph::NodeHandler;

/// The terminator. A pass-through that returns its input with
/// `success = true`; the executor invokes it outside the validator+retry
/// wrapper and then ends the turn.
pub struct EndNode;

impl EndNode {
    pub fn node_info() -> NodeInfo {
        NodeInfo {
            name: END_NODE.to_string(),
            description: "Ends the turn".to_string(),
            capabilities: vec!["turn termination".to_string()],
            input_requirements: vec![],
            output_fields: vec![],
        }
    }
}

#[async_trait]
impl NodeHandler for EndNode {
    async fn run(&self, mut state: TurnState, _input: &TurnInput) -> TurnState {
        state.success = true;
        state
    }
}
