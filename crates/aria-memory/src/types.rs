use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// Who wrote a conversation line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for Sender {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Sender::User),
            "assistant" => Ok(Sender::Assistant),
            other => Err(MemoryError::Invalid(format!("unknown sender: {other}"))),
        }
    }
}

/// Requested ordering for recent-conversation listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Oldest first — the order prompts want.
    Ascending,
    /// Newest first.
    Descending,
}

/// Metadata carried alongside an archived conversation document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMeta {
    pub start_time: String,
    pub end_time: String,
    pub participant: String,
}

/// A completed past conversation as stored by the memory collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedConversation {
    pub content: String,
    pub meta: ConversationMeta,
}

/// A relevance-search result over the conversation archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub content: String,
    pub meta: ConversationMeta,
}
