//! Long-term memory collaborator interface with a SQLite-backed
//! implementation, plus the append-only per-session conversation log files.
//!
//! Memory extraction, compression, and vector search belong to an external
//! collaborator; this crate stores what the core needs at prompt-assembly
//! time (latest memory snapshot, recent conversations, relevance search over
//! the archive via FTS5).

pub mod convlog;
pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use convlog::ConversationLog;
pub use error::{MemoryError, Result};
pub use store::{MemoryStore, SqliteMemoryStore};
pub use types::{ArchivedConversation, ConversationMeta, SearchHit, Sender, SortOrder};
