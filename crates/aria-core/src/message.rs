use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Key under which provenance is stored in a message's `extra` map.
///
/// Provenance is kept inside the open map rather than as a typed field so the
/// structural validator has a real contract to enforce and so downstream
/// prompt assembly can reflect the whole map into the model context.
pub const NODE_INFO_KEY: &str = "node_info";

/// The four closed message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Human,
    Assistant,
    System,
    Tool,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Human => "human",
            MessageKind::Assistant => "assistant",
            MessageKind::System => "system",
            MessageKind::Tool => "tool",
        }
    }
}

/// Which kind of node produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    UserFacing,
    Internal,
    Service,
}

/// Required provenance metadata attached to every message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub node_name: String,
    pub node_kind: NodeKind,
    /// RFC 3339 creation timestamp.
    pub timestamp: String,
}

impl Provenance {
    /// Provenance stamped with the current time.
    pub fn now(node_name: impl Into<String>, node_kind: NodeKind) -> Self {
        Self {
            node_name: node_name.into(),
            node_kind,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Message content: plain text, or (for human messages) mixed text-and-image
/// parts assembled by the LLM client when files are attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    /// Inline base64 data URI (`data:image/png;base64,...`).
    ImageUrl { url: String },
}

/// A single transcript entry.
///
/// Messages are append-only within a turn and never mutated after append;
/// every constructor writes a complete provenance record into `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    pub content: MessageContent,
    /// Open key→value metadata. Recognized keys: `node_info` (required),
    /// `file_info`, `file_content`, `understanding`, `action`, `reasoning`,
    /// `error`, plus tool-specific payloads.
    #[serde(default)]
    pub extra: Map<String, Value>,
    /// Set on `tool` messages only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Fresh per-invocation ID, set on `tool` messages only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn base(kind: MessageKind, content: impl Into<String>, provenance: Provenance) -> Self {
        let mut extra = Map::new();
        // Provenance serialization cannot fail: all fields are plain data.
        extra.insert(
            NODE_INFO_KEY.to_string(),
            serde_json::to_value(&provenance).unwrap_or(Value::Null),
        );
        Self {
            kind,
            content: MessageContent::Text(content.into()),
            extra,
            tool_name: None,
            tool_call_id: None,
        }
    }

    pub fn human(content: impl Into<String>, provenance: Provenance) -> Self {
        Self::base(MessageKind::Human, content, provenance)
    }

    pub fn assistant(content: impl Into<String>, provenance: Provenance) -> Self {
        Self::base(MessageKind::Assistant, content, provenance)
    }

    pub fn system(content: impl Into<String>, provenance: Provenance) -> Self {
        Self::base(MessageKind::System, content, provenance)
    }

    /// Tool result message with a fresh `tool_call_id`.
    pub fn tool(
        tool_name: impl Into<String>,
        content: impl Into<String>,
        provenance: Provenance,
    ) -> Self {
        let name = tool_name.into();
        let mut msg = Self::base(MessageKind::Tool, content, provenance);
        msg.tool_call_id = Some(format!("{}_{}", name, Uuid::new_v4()));
        msg.tool_name = Some(name);
        msg
    }

    /// Attach an extra metadata entry (builder style).
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Flattened text view of the content (image parts are skipped).
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Parse the provenance record back out of `extra`, if present and valid.
    pub fn provenance(&self) -> Option<Provenance> {
        self.extra
            .get(NODE_INFO_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// String-valued extra entry, if present.
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_stamp_provenance() {
        let msg = Message::human("hello", Provenance::now("unified_response", NodeKind::UserFacing));
        let prov = msg.provenance().expect("provenance");
        assert_eq!(prov.node_name, "unified_response");
        assert_eq!(prov.node_kind, NodeKind::UserFacing);
        assert!(!prov.timestamp.is_empty());
    }

    #[test]
    fn tool_messages_get_fresh_call_ids() {
        let prov = || Provenance::now("weather_search", NodeKind::Service);
        let a = Message::tool("weather_search", "sunny", prov());
        let b = Message::tool("weather_search", "sunny", prov());
        assert_eq!(a.tool_name.as_deref(), Some("weather_search"));
        assert_ne!(a.tool_call_id, b.tool_call_id);
    }

    #[test]
    fn text_flattens_parts() {
        let mut msg = Message::human("x", Provenance::now("n", NodeKind::UserFacing));
        msg.content = MessageContent::Parts(vec![
            ContentPart::Text {
                text: "look at this".to_string(),
            },
            ContentPart::ImageUrl {
                url: "data:image/png;base64,AAAA".to_string(),
            },
        ]);
        assert_eq!(msg.text(), "look at this");
    }

    #[test]
    fn extra_round_trips_arbitrary_keys() {
        let msg = Message::system("routing", Provenance::now("unified_response", NodeKind::Internal))
            .with_extra("action", Value::String("weather_search".into()))
            .with_extra("reasoning", Value::String("user asked about weather".into()));
        assert_eq!(msg.extra_str("action"), Some("weather_search"));
        assert_eq!(msg.extra_str("reasoning"), Some("user asked about weather"));
    }
}
