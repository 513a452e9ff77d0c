//! The ping document
//!
//! A ping is whatever JSON a client submitted. Nothing about its structure is
//! validated on the way in; accessors below walk it defensively and return
//! `None` for anything missing or of the wrong type.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One submitted telemetry event batch, stored exactly as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ping(Value);

impl Ping {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Borrow the raw document
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Look up a nested value by path segments, e.g. `["payload", "info"]`.
    ///
    /// Segments are object keys only; array indexing is not supported here.
    pub fn get_path(&self, path: &[&str]) -> Option<&Value> {
        path.iter()
            .try_fold(&self.0, |value, segment| value.as_object()?.get(*segment))
    }

    /// The document's `type` field, when the client sent one (`"main"`, `"event"`, ...)
    pub fn ping_type(&self) -> Option<&str> {
        self.get_path(&["type"]).and_then(Value::as_str)
    }

    /// Session timing metadata from `payload.info`, if either length is present.
    pub fn session_info(&self) -> Option<SessionInfo> {
        let info = self.get_path(&["payload", "info"])?.as_object()?;
        let session = SessionInfo {
            subsession_length: info.get("subsessionLength").and_then(Value::as_i64),
            session_length: info.get("sessionLength").and_then(Value::as_i64),
        };

        if session.subsession_length.is_none() && session.session_length.is_none() {
            None
        } else {
            Some(session)
        }
    }
}

impl From<Value> for Ping {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Session and subsession lengths in seconds, as reported by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub subsession_length: Option<i64>,
    pub session_length: Option<i64>,
}
