use serde_json::Value;
use thiserror::Error;

use crate::message::{Message, NODE_INFO_KEY};

/// Structural validation failure. Carries the index of the offending message
/// so the executor can surface it in the turn error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageShapeError {
    #[error("message[{index}] has no provenance: extra key 'node_info' is missing")]
    MissingProvenance { index: usize },

    #[error("message[{index}] provenance is not a map")]
    ProvenanceNotMap { index: usize },

    #[error("message[{index}] provenance is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },
}

const REQUIRED_FIELDS: [&str; 3] = ["node_name", "node_kind", "timestamp"];

/// Structural message checks — no semantic validation.
pub struct MessageValidator;

impl MessageValidator {
    /// Validate a single message at transcript position `index`.
    pub fn validate(msg: &Message, index: usize) -> Result<(), MessageShapeError> {
        let node_info = msg
            .extra
            .get(NODE_INFO_KEY)
            .ok_or(MessageShapeError::MissingProvenance { index })?;

        let map = match node_info {
            Value::Object(map) => map,
            _ => return Err(MessageShapeError::ProvenanceNotMap { index }),
        };

        for field in REQUIRED_FIELDS {
            if !map.contains_key(field) {
                return Err(MessageShapeError::MissingField { index, field });
            }
        }
        Ok(())
    }

    /// Validate every message, failing on the first invalid one.
    pub fn validate_all(messages: &[Message]) -> Result<(), MessageShapeError> {
        for (index, msg) in messages.iter().enumerate() {
            Self::validate(msg, index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{NodeKind, Provenance};
    use serde_json::json;

    fn valid_message() -> Message {
        Message::human("hi", Provenance::now("unified_response", NodeKind::UserFacing))
    }

    #[test]
    fn accepts_constructed_messages() {
        let msgs = vec![
            valid_message(),
            Message::tool(
                "weather_search",
                "sunny",
                Provenance::now("weather_search", NodeKind::Service),
            ),
        ];
        assert!(MessageValidator::validate_all(&msgs).is_ok());
    }

    #[test]
    fn rejects_missing_node_info() {
        let mut msg = valid_message();
        msg.extra.remove(NODE_INFO_KEY);
        assert_eq!(
            MessageValidator::validate(&msg, 3),
            Err(MessageShapeError::MissingProvenance { index: 3 })
        );
    }

    #[test]
    fn rejects_non_map_node_info() {
        let mut msg = valid_message();
        msg.extra
            .insert(NODE_INFO_KEY.to_string(), json!("not a map"));
        assert_eq!(
            MessageValidator::validate(&msg, 0),
            Err(MessageShapeError::ProvenanceNotMap { index: 0 })
        );
    }

    #[test]
    fn rejects_each_missing_required_field() {
        for field in ["node_name", "node_kind", "timestamp"] {
            let mut msg = valid_message();
            let node_info = msg
                .extra
                .get_mut(NODE_INFO_KEY)
                .and_then(|v| v.as_object_mut())
                .expect("node_info map");
            node_info.remove(field);
            let err = MessageValidator::validate(&msg, 1).expect_err("must fail");
            assert_eq!(err, MessageShapeError::MissingField { index: 1, field });
        }
    }

    #[test]
    fn validate_all_reports_failing_index() {
        let mut bad = valid_message();
        bad.extra.remove(NODE_INFO_KEY);
        let msgs = vec![valid_message(), valid_message(), bad];
        let err = MessageValidator::validate_all(&msgs).expect_err("must fail");
        assert!(err.to_string().contains("message[2]"));
    }
}
