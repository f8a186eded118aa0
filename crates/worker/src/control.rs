//! Control messages posted by the application shell.

use serde_json::Value;

/// A recognized control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Activate the waiting version without waiting for old clients to close.
    SkipWaiting,
}

impl ControlMessage {
    /// Match `data` against the control token.
    ///
    /// Accepts the bare token as a string, or an object whose `type` field is
    /// the token. Everything else yields `None`.
    pub fn parse(data: &Value, token: &str) -> Option<Self> {
        let candidate = match data {
            Value::String(s) => s.as_str(),
            Value::Object(map) => map.get("type")?.as_str()?,
            _ => return None,
        };
        (candidate == token).then_some(ControlMessage::SkipWaiting)
    }
}
