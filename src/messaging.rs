/// Runtime messages exchanged between the popup and the content script
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request from the popup, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    SaveCurrentVideo,
    Refresh,
    GetStats,
    Ping,
    GetStatus,
}

impl Command {
    /// Parse a raw message. Unknown or missing actions are errors.
    pub fn parse(message: &Value) -> Result<Command, String> {
        match message.get("action").and_then(Value::as_str) {
            None => Err("Missing action".to_string()),
            Some(action) => serde_json::from_value(message.clone()).map_err(|_| format!("Unknown action: {}", action)),
        }
    }
}

/// Reply sent back through `sendResponse`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    pub fn ok() -> Self {
        CommandResponse {
            success: true,
            message: None,
            data: None,
            error: None,
        }
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        CommandResponse {
            message: Some(message.into()),
            ..Self::ok()
        }
    }

    pub fn with_data(data: Value) -> Self {
        CommandResponse {
            data: Some(data),
            ..Self::ok()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        CommandResponse {
            success: false,
            message: None,
            data: None,
            error: Some(error.into()),
        }
    }
}
