//! Client Protocol Types
//!
//! One JSON request per message, one JSON response back:
//!
//! ```text
//! -> {"command": "get_movements"}
//! <- {"type": "movements", "data": [[x, y, captured_at], ...]}
//! -> {"command": "get_current_location"}
//! <- {"type": "current_location", "data": [x, y] | null}
//! -> {"command": "check_status"}
//! <- {"type": "status", "data": true}
//! <- {"type": "error", "data": "unknown command \"bogus\""}
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::cache::{GazeSample, Location};

/// Requests a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Drain every buffered sample.
    GetMovements,
    /// Peek at the most recent position.
    GetCurrentLocation,
    /// Ask whether samples are waiting.
    CheckStatus,
}

impl Command {
    pub const ALL: [Command; 3] = [
        Command::GetMovements,
        Command::GetCurrentLocation,
        Command::CheckStatus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::GetMovements => "get_movements",
            Command::GetCurrentLocation => "get_current_location",
            Command::CheckStatus => "check_status",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownCommand(s.to_string()))
    }
}

/// Responses sent back to the requesting client only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Response {
    Movements(Vec<GazeSample>),
    CurrentLocation(Option<Location>),
    Status(bool),
    Error(String),
}

impl Response {
    pub fn to_json(&self) -> String {
        // Every variant is plain data; serialization cannot fail.
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"type":"error","data":"{}"}}"#, e))
    }
}

impl From<ProtocolError> for Response {
    fn from(err: ProtocolError) -> Self {
        Response::Error(err.to_string())
    }
}

/// Why an inbound message could not be turned into a [`Command`].
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("request must be a JSON object")]
    NotAnObject,

    #[error("request has no \"command\" field")]
    MissingCommand,

    #[error("\"command\" must be a string")]
    CommandNotString,

    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("binary frames must contain UTF-8 JSON")]
    UnsupportedFrame,
}

/// Decode one request message.
pub fn decode_command(text: &str) -> Result<Command, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    let object = value.as_object().ok_or(ProtocolError::NotAnObject)?;
    let command = object.get("command").ok_or(ProtocolError::MissingCommand)?;
    command
        .as_str()
        .ok_or(ProtocolError::CommandNotString)?
        .parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_known_commands() {
        for command in Command::ALL {
            let text = serde_json::to_string(&command).unwrap();
            assert_eq!(decode_command(&text), Ok(command));
        }
        assert_eq!(
            decode_command(r#"{"command": "get_movements"}"#),
            Ok(Command::GetMovements)
        );
    }

    #[test]
    fn extra_fields_are_ignored() {
        assert_eq!(
            decode_command(r#"{"command": "check_status", "id": 7}"#),
            Ok(Command::CheckStatus)
        );
    }

    #[test]
    fn rejects_bad_requests() {
        assert_eq!(
            decode_command(r#"{"command": "bogus"}"#),
            Err(ProtocolError::UnknownCommand("bogus".to_string()))
        );
        assert_eq!(decode_command(r#"{}"#), Err(ProtocolError::MissingCommand));
        assert_eq!(
            decode_command(r#"{"command": 3}"#),
            Err(ProtocolError::CommandNotString)
        );
        assert_eq!(
            decode_command(r#"["get_movements"]"#),
            Err(ProtocolError::NotAnObject)
        );
        assert!(matches!(
            decode_command("get_movements"),
            Err(ProtocolError::Malformed(_))
        ));
        // Command names are case-sensitive.
        assert!(matches!(
            decode_command(r#"{"command": "GET_MOVEMENTS"}"#),
            Err(ProtocolError::UnknownCommand(_))
        ));
    }

    #[test]
    fn response_wire_shapes() {
        let movements = Response::Movements(vec![
            GazeSample::new(0.25, 0.5, 1000),
            GazeSample::new(0.75, 0.5, 1001),
        ]);
        assert_eq!(
            serde_json::to_value(&movements).unwrap(),
            json!({"type": "movements", "data": [[0.25, 0.5, 1000], [0.75, 0.5, 1001]]})
        );
        assert_eq!(
            serde_json::to_value(Response::Movements(Vec::new())).unwrap(),
            json!({"type": "movements", "data": []})
        );
        assert_eq!(
            serde_json::to_value(Response::CurrentLocation(Some(Location { x: 0.5, y: 0.125 })))
                .unwrap(),
            json!({"type": "current_location", "data": [0.5, 0.125]})
        );
        assert_eq!(
            serde_json::to_value(Response::CurrentLocation(None)).unwrap(),
            json!({"type": "current_location", "data": null})
        );
        assert_eq!(
            serde_json::to_value(Response::Status(true)).unwrap(),
            json!({"type": "status", "data": true})
        );
        assert_eq!(
            serde_json::to_value(Response::from(ProtocolError::MissingCommand)).unwrap(),
            json!({"type": "error", "data": "request has no \"command\" field"})
        );
    }

    #[test]
    fn response_parses_back() {
        let text = r#"{"type":"current_location","data":[0.5,0.5]}"#;
        let response: Response = serde_json::from_str(text).unwrap();
        assert_eq!(
            response,
            Response::CurrentLocation(Some(Location { x: 0.5, y: 0.5 }))
        );
    }
}
