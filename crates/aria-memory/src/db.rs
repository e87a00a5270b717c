use rusqlite::{Connection, Result};

/// Initialise memory tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_messages_table(conn)?;
    create_archive_table(conn)?;
    create_archive_fts(conn)?;
    create_snapshots_table(conn)?;
    Ok(())
}

/// Per-session, per-line transcript written as turns complete.
fn create_messages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversation_messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id  TEXT NOT NULL,
            sender      TEXT NOT NULL,
            content     TEXT NOT NULL,
            file_note   TEXT,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_session
            ON conversation_messages(session_id, created_at);",
    )
}

/// Completed conversations as whole documents, written by the memory
/// collaborator's compression pass.
fn create_archive_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversation_archive (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            content     TEXT NOT NULL,
            start_time  TEXT NOT NULL,
            end_time    TEXT NOT NULL,
            participant TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_archive_start
            ON conversation_archive(start_time DESC);",
    )
}

/// FTS5 virtual table over archived conversation content.
/// content='' makes it an external-content table — synced manually on write.
fn create_archive_fts(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS conversation_archive_fts
            USING fts5(content, content='conversation_archive', content_rowid='id');",
    )
}

/// Latest long-term memory dumps; only the newest row is served.
fn create_snapshots_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS memory_snapshots (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );",
    )
}
