use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use serde_json::{json, Value};
use tracing::{debug, warn};

use aria_core::state::TurnState;

use crate::error::{GraphError, Result};

/// Writes per-node state snapshots for debugging and replay.
///
/// Each snapshot produces a pair of files under `<root>/<session_id>/`:
/// an opaque bincode dump (`{ms}_{label}.bin`) for exact replay and a
/// best-effort JSON rendering (`{ms}_{label}.json`) for human inspection.
/// Timestamps are strictly increasing per session. Failures are logged and
/// never propagated — snapshots are diagnostic, not part of the turn
/// contract.
pub struct StateLogSink {
    root: PathBuf,
    /// Last timestamp issued per session; serializes writes per directory.
    last_ms: Mutex<HashMap<String, i64>>,
}

impl StateLogSink {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            last_ms: Mutex::new(HashMap::new()),
        }
    }

    /// Record `state` under `label`. Never fails from the caller's view.
    pub fn snapshot(&self, session_id: &str, state: &TurnState, label: &str) {
        if let Err(e) = self.write(session_id, state, label) {
            warn!(session = %session_id, label, error = %e, "state snapshot failed");
        }
    }

    fn write(&self, session_id: &str, state: &TurnState, label: &str) -> Result<()> {
        let dir = self.root.join(session_id);
        fs::create_dir_all(&dir)?;

        let ms = self.next_timestamp(session_id);

        let encoded =
            bincode::serialize(state).map_err(|e| GraphError::Encode(e.to_string()))?;
        fs::write(dir.join(format!("{ms}_{label}.bin")), encoded)?;

        let rendered = serde_json::to_vec_pretty(&json_view(state))
            .map_err(|e| GraphError::Encode(e.to_string()))?;
        fs::write(dir.join(format!("{ms}_{label}.json")), rendered)?;

        debug!(session = %session_id, label, ms, "state snapshot written");
        Ok(())
    }

    /// Current wall-clock millis, bumped past the previous snapshot's stamp
    /// when the clock has not advanced (keeps filenames strictly ordered).
    fn next_timestamp(&self, session_id: &str) -> i64 {
        let mut guard = self.last_ms.lock().unwrap();
        let last = guard.entry(session_id.to_string()).or_insert(0);
        let mut now = chrono::Utc::now().timestamp_millis();
        if now <= *last {
            now = *last + 1;
        }
        *last = now;
        now
    }
}

/// Best-effort JSON view: every top-level field serialized independently,
/// substituting the type name for anything that fails to serialize.
fn json_view(state: &TurnState) -> Value {
    json!({
        "input_text": state.input_text,
        "files": field(&state.files, "Vec<FileDescriptor>"),
        "processed_input": state.processed_input,
        "messages": field(&state.messages, "Vec<Message>"),
        "available_nodes": field(&state.available_nodes, "BTreeMap<String, NodeInfo>"),
        "next_node": state.next_node,
        "response": state.response,
        "inactivity_timeout": state.inactivity_timeout,
        "is_auto_response": state.is_auto_response,
        "is_inactivity_reminder": state.is_inactivity_reminder,
        "success": state.success,
        "fatal": state.fatal,
        "error": state.error,
    })
}

fn field<T: serde::Serialize>(value: &T, type_name: &str) -> Value {
    serde_json::to_value(value).unwrap_or_else(|_| Value::String(format!("<{type_name}>")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aria_core::files::FileDescriptor;
    use aria_core::state::{TurnFlags, TurnState};
    use std::collections::BTreeMap;

    fn state_with_file() -> TurnState {
        let mut state = TurnState::new(BTreeMap::new(), TurnFlags::default());
        state
            .files
            .push(FileDescriptor::from_upload("cat.png", "image/png", vec![0xAB; 128]));
        state
    }

    #[test]
    fn writes_bin_and_json_pairs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = StateLogSink::new(dir.path().to_path_buf());
        let state = state_with_file();

        sink.snapshot("session-1", &state, "unified_response");
        sink.snapshot("session-1", &state, "final_state");

        let mut names: Vec<String> = fs::read_dir(dir.path().join("session-1"))
            .expect("session dir")
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names.len(), 4);
        assert!(names.iter().any(|n| n.ends_with("_unified_response.bin")));
        assert!(names.iter().any(|n| n.ends_with("_final_state.json")));
    }

    #[test]
    fn timestamps_strictly_increase() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = StateLogSink::new(dir.path().to_path_buf());
        let state = state_with_file();

        for i in 0..5 {
            sink.snapshot("s", &state, &format!("step{i}"));
        }

        let mut stamps: Vec<i64> = fs::read_dir(dir.path().join("s"))
            .expect("dir")
            .filter_map(|e| {
                let name = e.unwrap().file_name().to_string_lossy().to_string();
                if !name.ends_with(".bin") {
                    return None;
                }
                name.split('_').next()?.parse().ok()
            })
            .collect();
        stamps.sort();
        for pair in stamps.windows(2) {
            assert!(pair[0] < pair[1], "timestamps must strictly increase");
        }
    }

    #[test]
    fn snapshots_never_contain_file_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = StateLogSink::new(dir.path().to_path_buf());
        let state = state_with_file();

        sink.snapshot("s", &state, "ingress");

        for entry in fs::read_dir(dir.path().join("s")).expect("dir") {
            let bytes = fs::read(entry.unwrap().path()).expect("read");
            // The payload is 128 copies of 0xAB; no snapshot may carry it.
            let leaked = bytes.windows(16).any(|w| w.iter().all(|b| *b == 0xAB));
            assert!(!leaked, "snapshot leaked raw file bytes");
        }
    }

    #[test]
    fn failures_do_not_propagate() {
        // Point the sink at a path that cannot be a directory.
        let file = tempfile::NamedTempFile::new().expect("tempfile");
        let sink = StateLogSink::new(file.path().to_path_buf());
        let state = state_with_file();
        // Must not panic or return an error.
        sink.snapshot("s", &state, "whatever");
    }
}
