use serde::{Deserialize, Serialize};

/// A known client session.
///
/// Sessions are upserted on activation and never deleted; they simply stop
/// being the active one when another session takes over or the transport
/// disconnects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 timestamp of the most recent activity.
    pub last_activity: String,
}

impl Session {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            session_id: session_id.into(),
            created_at: now.clone(),
            last_activity: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = chrono::Utc::now().to_rfc3339();
    }
}
