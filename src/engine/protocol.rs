//! Engine Wire Protocol
//!
//! One JSON object per line in each direction. Requests carry a `type`
//! discriminator; state and action payloads are sent flattened, with the
//! discriminator overriding any `type` field they already carry.
//!
//! A response of the form `{"type": "response", "error": true,
//! "response": "..."}` is a rejection; anything else is a success and,
//! for `display`, is the board state itself.

use serde::Serialize;
use serde_json::{json, Map, Value};

use super::EngineError;
use crate::game::GameState;
use crate::log_book::RawLogEntry;

/// Engine commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineCommand {
    /// Return the current board state.
    Display,
    /// Terminate the engine.
    Exit,
}

/// Requests sent to the engine.
#[derive(Debug, Clone, Copy)]
pub enum EngineRequest<'a> {
    /// Select a game version.
    Version(&'a str),
    /// Replace the board.
    State(&'a GameState),
    /// Apply an action.
    Action(&'a RawLogEntry),
    /// Run a command.
    Command(EngineCommand),
}

impl EngineRequest<'_> {
    /// Short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineRequest::Version(_) => "version",
            EngineRequest::State(_) => "state",
            EngineRequest::Action(_) => "action",
            EngineRequest::Command(_) => "command",
        }
    }

    /// JSON form of the request.
    pub fn to_json(&self) -> Result<Value, EngineError> {
        let value = match self {
            EngineRequest::Version(version) => json!({ "type": "version", "version": version }),
            EngineRequest::State(state) => {
                let fields = state.as_object().ok_or_else(|| {
                    EngineError::InvalidRequest("board state must be a JSON object".to_string())
                })?;
                tagged("state", fields)
            }
            EngineRequest::Action(raw) => tagged("action", raw),
            EngineRequest::Command(command) => json!({ "type": "command", "command": command }),
        };

        Ok(value)
    }

    /// Newline-terminated wire form.
    pub fn to_line(&self) -> Result<String, EngineError> {
        let mut line = self.to_json()?.to_string();
        line.push('\n');
        Ok(line)
    }
}

fn tagged(kind: &str, fields: &Map<String, Value>) -> Value {
    let mut object = fields.clone();
    object.insert("type".to_string(), Value::String(kind.to_string()));
    Value::Object(object)
}

/// Interpret one response line.
pub fn parse_response(line: &str) -> Result<Value, EngineError> {
    let value: Value = serde_json::from_str(line.trim_end())?;

    let is_error = value.get("type").and_then(Value::as_str) == Some("response")
        && value.get("error").and_then(Value::as_bool).unwrap_or(false);

    if is_error {
        let message = match value.get("response") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "unknown error".to_string(),
        };
        return Err(EngineError::Rejected(message));
    }

    Ok(value)
}
