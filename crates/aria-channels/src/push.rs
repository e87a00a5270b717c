use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Notifications the core produces for the transport layer to deliver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PushEvent {
    /// A synthesized voice fragment is ready to stream. Fragments for one
    /// reply are always emitted in index order; `is_last` rides on the final
    /// fragment only.
    VoiceFileReady {
        filename: String,
        index: usize,
        is_last: bool,
        target_session_id: String,
    },

    /// A core-initiated reminder for the active session.
    InactivityReminder {
        response: String,
        session_id: String,
        timestamp: String,
    },

    /// Confirmation that a session became the active one.
    SessionActivated {
        session_id: String,
        timestamp: String,
    },
}

/// Abstract channel used to deliver notifications to connected clients.
///
/// Implementations must be `Send + Sync`; `push` takes `&self` so a
/// connected adapter can deliver concurrently from multiple tasks.
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Stable lowercase identifier for this channel (e.g. `"websocket"`).
    fn name(&self) -> &str;

    /// Deliver a single event.
    async fn push(&self, event: &PushEvent) -> Result<(), ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_snake_case_tags() {
        let event = PushEvent::VoiceFileReady {
            filename: "voice_0.wav".to_string(),
            index: 0,
            is_last: false,
            target_session_id: "s-1".to_string(),
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["event"], "voice_file_ready");
        assert_eq!(json["filename"], "voice_0.wav");

        let reminder = PushEvent::InactivityReminder {
            response: "still there?".to_string(),
            session_id: "s-1".to_string(),
            timestamp: "2026-08-01T12:00:00Z".to_string(),
        };
        let json = serde_json::to_value(&reminder).expect("serialize");
        assert_eq!(json["event"], "inactivity_reminder");
    }
}
