use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::debug;

use crate::error::Result;
use crate::types::Sender;

/// Append-only per-session conversation transcript files.
///
/// Each session gets one `session_{yyyymmdd_hhmmss}.txt` inside its session
/// directory (named when the first line is written). Lines are
/// `[iso_timestamp] {user|assistant}: {text}` with optional
/// `(file info: …)` / `(attached files: …)` suffix lines. Writes are
/// serialized per session.
pub struct ConversationLog {
    root: PathBuf,
    files: Mutex<HashMap<String, PathBuf>>,
}

impl ConversationLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: Mutex::new(HashMap::new()),
        }
    }

    /// Append one conversation line for `session_id`.
    pub fn append(
        &self,
        session_id: &str,
        sender: Sender,
        text: &str,
        file_info: Option<&str>,
        attached_files: Option<&str>,
    ) -> Result<()> {
        // Holding the map lock for the whole write serializes appends per
        // session (and, coarsely, across sessions — these are small lines).
        let mut files = self.files.lock().unwrap();
        let path = files
            .entry(session_id.to_string())
            .or_insert_with(|| {
                let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
                self.root
                    .join(session_id)
                    .join(format!("session_{stamp}.txt"))
            })
            .clone();

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let mut line = format!(
            "[{}] {}: {}",
            chrono::Local::now().to_rfc3339(),
            sender.as_str(),
            text
        );
        if let Some(info) = file_info.filter(|s| !s.is_empty()) {
            line.push_str(&format!("\n(file info: {info})"));
        }
        if let Some(attached) = attached_files.filter(|s| !s.is_empty()) {
            line.push_str(&format!("\n(attached files: {attached})"));
        }
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;

        debug!(session = %session_id, sender = sender.as_str(), "conversation line appended");
        Ok(())
    }
}
