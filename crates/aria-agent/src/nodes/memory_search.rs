use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use aria_core::message::{Message, MessageKind, NodeKind, Provenance};
use aria_core::state::{TurnInput, TurnState, MEMORY_SEARCH_NODE, UNIFIED_NODE};
use aria_graph::NodeHandler;
use aria_memory::MemoryStore;

/// How many trailing transcript contents feed the query.
const QUERY_MESSAGE_LIMIT: usize = 10;
/// Hits requested from the store.
const RESULT_LIMIT: usize = 5;

/// Tool node: searches past conversations for content related to the
/// current exchange and hands the hits back to the decision node.
pub struct MemorySearchNode {
    memory: Arc<dyn MemoryStore>,
}

impl MemorySearchNode {
    pub fn new(memory: Arc<dyn MemoryStore>) -> Self {
        Self { memory }
    }

    pub fn node_info() -> aria_core::state::NodeInfo {
        aria_core::state::NodeInfo {
            name: MEMORY_SEARCH_NODE.to_string(),
            description: "Searches past conversations for related content".to_string(),
            capabilities: vec![
                "conversation search".to_string(),
                "memory recall".to_string(),
            ],
            input_requirements: vec!["input_text".to_string(), "processed_input".to_string()],
            output_fields: vec!["memory_search_results".to_string()],
        }
    }
}

#[async_trait]
impl NodeHandler for MemorySearchNode {
    async fn run(&self, mut state: TurnState, _input: &TurnInput) -> TurnState {
        let query = build_query(&state);

        match self.memory.search(&query, RESULT_LIMIT) {
            Ok(hits) => {
                let results = if hits.is_empty() {
                    "No related past conversations were found.".to_string()
                } else {
                    let mut formatted = String::from("Related past conversations:\n");
                    for (idx, hit) in hits.iter().enumerate() {
                        formatted.push_str(&format!(
                            "\nConversation {}:\n- time: {}\n- participant: {}\n- content:\n{}\n",
                            idx + 1,
                            hit.meta.start_time,
                            hit.meta.participant,
                            hit.content
                        ));
                    }
                    formatted
                };
                info!(hits = hits.len(), "memory search complete");

                state.messages.push(
                    Message::tool(
                        MEMORY_SEARCH_NODE,
                        results.clone(),
                        Provenance::now(MEMORY_SEARCH_NODE, NodeKind::Service),
                    )
                    .with_extra(
                        "memory_info",
                        json!({ "query": query, "result_count": hits.len() }),
                    ),
                );
                state.response = results;
                state.success = true;
            }
            Err(e) => {
                let summary = format!("memory search failed: {e}");
                warn!(error = %e, "memory search failed");

                state.messages.push(
                    Message::tool(
                        MEMORY_SEARCH_NODE,
                        summary.clone(),
                        Provenance::now(MEMORY_SEARCH_NODE, NodeKind::Service),
                    )
                    .with_extra("error", json!(e.to_string())),
                );
                state.response = summary.clone();
                state.success = false;
                state.error = Some(summary);
            }
        }

        state.next_node = UNIFIED_NODE.to_string();
        state
    }
}

/// Query text: the last few human/assistant contents, the unified
/// understanding, and — when the latest assistant turn recorded one — its
/// `understanding` extra.
fn build_query(state: &TurnState) -> String {
    let mut contents: Vec<String> = state
        .messages
        .iter()
        .filter(|m| matches!(m.kind, MessageKind::Human | MessageKind::Assistant))
        .map(|m| m.text())
        .collect();
    if contents.len() > QUERY_MESSAGE_LIMIT {
        contents = contents.split_off(contents.len() - QUERY_MESSAGE_LIMIT);
    }

    let mut query = contents.join(" ");
    if !state.processed_input.is_empty() {
        query.push(' ');
        query.push_str(&state.processed_input);
    }
    if let Some(last) = state.messages.last() {
        if last.kind == MessageKind::Assistant {
            if let Some(understanding) = last.extra_str("understanding") {
                query.push(' ');
                query.push_str(understanding);
            }
        }
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use aria_core::state::TurnFlags;
    use aria_memory::{ConversationMeta, SqliteMemoryStore};
    use std::collections::BTreeMap;

    fn seeded_store() -> Arc<SqliteMemoryStore> {
        let store = SqliteMemoryStore::in_memory().expect("store");
        store
            .archive_conversation(
                "user: my cat knocked over the ficus again\nassistant: that cat has a vendetta.",
                &ConversationMeta {
                    start_time: "2026-07-20T19:00:00Z".to_string(),
                    end_time: "2026-07-20T19:20:00Z".to_string(),
                    participant: "master".to_string(),
                },
            )
            .expect("archive");
        Arc::new(store)
    }

    fn state_with_messages(texts: &[&str]) -> TurnState {
        let mut state = TurnState::new(BTreeMap::new(), TurnFlags::default());
        for text in texts {
            state.messages.push(Message::human(
                *text,
                Provenance::now(UNIFIED_NODE, NodeKind::UserFacing),
            ));
        }
        state
    }

    #[test]
    fn query_is_capped_at_the_trailing_messages() {
        let texts: Vec<String> = (0..15).map(|i| format!("message {i}")).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let state = state_with_messages(&refs);

        let query = build_query(&state);
        assert!(!query.contains("message 4"));
        assert!(query.contains("message 5"));
        assert!(query.contains("message 14"));
    }

    #[tokio::test]
    async fn finds_related_conversations_and_routes_back() {
        let node = MemorySearchNode::new(seeded_store());
        let mut state = state_with_messages(&["what did my cat do to the plant?"]);
        state.processed_input = "user asks about the cat and the ficus".to_string();

        let result = node.run(state, &TurnInput::default()).await;

        assert!(result.success);
        assert_eq!(result.next_node, UNIFIED_NODE);
        let tool_msg = result.messages.last().expect("tool message");
        assert_eq!(tool_msg.kind, MessageKind::Tool);
        assert!(tool_msg.text().contains("ficus"));
        assert_eq!(
            tool_msg.extra["memory_info"]["result_count"].as_u64(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn empty_archive_reports_no_hits() {
        let node = MemorySearchNode::new(Arc::new(
            SqliteMemoryStore::in_memory().expect("store"),
        ));
        let state = state_with_messages(&["anything about skiing?"]);

        let result = node.run(state, &TurnInput::default()).await;

        assert!(result.success);
        assert!(result
            .response
            .contains("No related past conversations were found"));
    }
}
