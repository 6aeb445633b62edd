//! Inbound response frames and data classification.
//!
//! A response's `data` field is either a payload or an error-shaped
//! value; the shape rules are in ARCHITECTURE.md Section 2.2.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RemoteError;
use crate::identifiers::MessageId;

// ============================================================================
// ResponseFrame
// ============================================================================

/// A response from the core to one outstanding request.
///
/// # Format
///
/// ```json
/// { "responseId": "7", "data": { "pong": true } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseFrame {
    /// Matches the request's `messageId`.
    pub response_id: MessageId,

    /// Response payload or error-shaped value.
    #[serde(default)]
    pub data: Value,
}

impl ResponseFrame {
    /// Creates a response frame.
    #[inline]
    #[must_use]
    pub fn new(response_id: MessageId, data: Value) -> Self {
        Self { response_id, data }
    }
}

// ============================================================================
// ResponseData
// ============================================================================

/// The classified `data` field of a response.
#[derive(Debug, Clone)]
pub enum ResponseData {
    /// A plain payload, delivered as-is.
    Payload(Value),

    /// An error-shaped value.
    Error(RemoteError),
}

impl ResponseData {
    /// Classifies a raw `data` value.
    ///
    /// A value is error-shaped when it is an object with a string
    /// `name` and at least one of: a string `message`, a string
    /// `stack`, a boolean `isDisconnecting`. Everything else is a
    /// payload.
    #[must_use]
    pub fn classify(data: Value) -> Self {
        match error_shape(&data) {
            Some(remote) => Self::Error(remote),
            None => Self::Payload(data),
        }
    }
}

/// Extracts a [`RemoteError`] from an error-shaped value.
fn error_shape(data: &Value) -> Option<RemoteError> {
    let object = data.as_object()?;
    let name = object.get("name")?.as_str()?;

    let has_error_marker = object.get("message").is_some_and(Value::is_string)
        || object.get("stack").is_some_and(Value::is_string)
        || object.get("isDisconnecting").is_some_and(Value::is_boolean);
    if !has_error_marker {
        return None;
    }

    let mut extra = Map::new();
    for (key, value) in object {
        match key.as_str() {
            "name" | "message" | "stack" | "isDisconnecting" => {}
            _ => {
                extra.insert(key.clone(), value.clone());
            }
        }
    }

    Some(RemoteError {
        name: name.to_string(),
        message: object
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        stack: object
            .get("stack")
            .and_then(Value::as_str)
            .map(str::to_string),
        is_disconnecting: object.get("isDisconnecting").and_then(Value::as_bool),
        data: extra,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_payload_classification() {
        let data = json!({ "pong": true });
        match ResponseData::classify(data.clone()) {
            ResponseData::Payload(value) => assert_eq!(value, data),
            ResponseData::Error(_) => panic!("payload classified as error"),
        }
    }

    #[test]
    fn test_error_classification() {
        let data = json!({
            "name": "ScriptError",
            "message": "boom",
            "stack": "at line 3",
            "line": 3
        });

        match ResponseData::classify(data) {
            ResponseData::Error(remote) => {
                assert_eq!(remote.name, "ScriptError");
                assert_eq!(remote.message, "boom");
                assert_eq!(remote.stack.as_deref(), Some("at line 3"));
                assert_eq!(remote.data.get("line").and_then(Value::as_u64), Some(3));
            }
            ResponseData::Payload(_) => panic!("error classified as payload"),
        }
    }

    #[test]
    fn test_marker_alone_is_error_shaped() {
        let data = json!({ "name": "X", "isDisconnecting": true });
        match ResponseData::classify(data) {
            ResponseData::Error(remote) => {
                assert_eq!(remote.name, "X");
                assert_eq!(remote.is_disconnecting, Some(true));
            }
            ResponseData::Payload(_) => panic!("marked error classified as payload"),
        }
    }

    #[test]
    fn test_name_without_markers_is_payload() {
        // A payload may legitimately carry a `name` field.
        let data = json!({ "name": "my-session", "id": 4 });
        assert!(matches!(
            ResponseData::classify(data),
            ResponseData::Payload(_)
        ));
    }

    #[test]
    fn test_scalar_and_null_are_payloads() {
        assert!(matches!(
            ResponseData::classify(Value::Null),
            ResponseData::Payload(Value::Null)
        ));
        assert!(matches!(
            ResponseData::classify(json!(3)),
            ResponseData::Payload(_)
        ));
    }

    #[test]
    fn test_response_frame_deserialization() {
        let frame: ResponseFrame =
            serde_json::from_str(r#"{ "responseId": "5", "data": { "ok": true } }"#)
                .expect("parse");
        assert_eq!(frame.response_id.as_str(), "5");
        assert_eq!(frame.data.get("ok").and_then(Value::as_bool), Some(true));
    }

    #[test]
    fn test_response_frame_missing_data_defaults_to_null() {
        let frame: ResponseFrame =
            serde_json::from_str(r#"{ "responseId": "5" }"#).expect("parse");
        assert!(frame.data.is_null());
    }
}
