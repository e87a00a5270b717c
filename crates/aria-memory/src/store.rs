use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, instrument};

use crate::db::init_db;
use crate::error::Result;
use crate::types::{ArchivedConversation, ConversationMeta, SearchHit, Sender, SortOrder};

/// Maximum FTS terms taken from a free-text query.
const MAX_QUERY_TERMS: usize = 12;

/// What the core reads from (and appends to) long-term memory.
///
/// Absence of a snapshot is not an error — it means "first conversation".
pub trait MemoryStore: Send + Sync {
    /// Best-effort textual dump of long-term memory, newest first.
    fn load_latest_snapshot(&self) -> Result<Option<String>>;

    /// The `limit` most recent completed conversations. `Ascending` returns
    /// them oldest-first (the order prompt assembly wants).
    fn recent_conversations(
        &self,
        limit: usize,
        order: SortOrder,
    ) -> Result<Vec<ArchivedConversation>>;

    /// Relevance search over the conversation archive, top `k` hits.
    fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>>;

    /// Append one line to the per-session transcript.
    fn append_message(
        &self,
        session_id: &str,
        sender: Sender,
        text: &str,
        file_note: Option<&str>,
    ) -> Result<()>;
}

/// SQLite-backed store. Wraps a single connection in a `Mutex`; sufficient
/// for the single-node target.
pub struct SqliteMemoryStore {
    db: Mutex<Connection>,
}

impl SqliteMemoryStore {
    /// Wrap a connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// In-memory store for tests and ephemeral runs.
    pub fn in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    /// Store a completed conversation document. Called by the memory
    /// collaborator's compression pass; also syncs the FTS index.
    #[instrument(skip(self, content))]
    pub fn archive_conversation(&self, content: &str, meta: &ConversationMeta) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO conversation_archive (content, start_time, end_time, participant)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![content, meta.start_time, meta.end_time, meta.participant],
        )?;
        let id = db.last_insert_rowid();
        db.execute(
            "INSERT INTO conversation_archive_fts(rowid, content) VALUES(?1, ?2)",
            rusqlite::params![id, content],
        )?;
        Ok(())
    }

    /// Record a new memory snapshot; `load_latest_snapshot` serves the
    /// newest row.
    pub fn store_snapshot(&self, content: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO memory_snapshots (content, created_at) VALUES (?1, ?2)",
            rusqlite::params![content, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

impl MemoryStore for SqliteMemoryStore {
    fn load_latest_snapshot(&self) -> Result<Option<String>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT content FROM memory_snapshots ORDER BY id DESC LIMIT 1",
            [],
            |row| row.get::<_, String>(0),
        ) {
            Ok(content) => Ok(Some(content)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    fn recent_conversations(
        &self,
        limit: usize,
        order: SortOrder,
    ) -> Result<Vec<ArchivedConversation>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT content, start_time, end_time, participant
             FROM conversation_archive
             ORDER BY start_time DESC
             LIMIT ?1",
        )?;
        let mut rows: Vec<ArchivedConversation> = stmt
            .query_map([limit as i64], |row| {
                Ok(ArchivedConversation {
                    content: row.get(0)?,
                    meta: ConversationMeta {
                        start_time: row.get(1)?,
                        end_time: row.get(2)?,
                        participant: row.get(3)?,
                    },
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        if order == SortOrder::Ascending {
            rows.reverse();
        }
        Ok(rows)
    }

    #[instrument(skip(self, query))]
    fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let fts_query = fts_escape(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }

        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT a.content, a.start_time, a.end_time, a.participant
             FROM conversation_archive_fts f
             JOIN conversation_archive a ON a.id = f.rowid
             WHERE conversation_archive_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
        )?;
        let hits: Vec<SearchHit> = stmt
            .query_map(rusqlite::params![fts_query, k as i64], |row| {
                Ok(SearchHit {
                    content: row.get(0)?,
                    meta: ConversationMeta {
                        start_time: row.get(1)?,
                        end_time: row.get(2)?,
                        participant: row.get(3)?,
                    },
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        debug!(hits = hits.len(), "archive search complete");
        Ok(hits)
    }

    fn append_message(
        &self,
        session_id: &str,
        sender: Sender,
        text: &str,
        file_note: Option<&str>,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO conversation_messages (session_id, sender, content, file_note, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                session_id,
                sender.as_str(),
                text,
                file_note,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

/// Turn free text into an FTS5 MATCH expression: quoted alphanumeric terms
/// joined with OR, capped at [`MAX_QUERY_TERMS`]. Stripping punctuation
/// keeps user input from being parsed as FTS syntax.
fn fts_escape(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| term.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|t| t.chars().count() > 1)
        .take(MAX_QUERY_TERMS)
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}
