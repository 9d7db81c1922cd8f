//! Request/response contract shared by every front end and the executor.

use crate::SessionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub type DataMap = serde_json::Map<String, Value>;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    Cli,
    Tui,
    Sui,
    Api,
    Internal,
}

impl InterfaceKind {
    pub const ALL: [InterfaceKind; 5] = [
        InterfaceKind::Cli,
        InterfaceKind::Tui,
        InterfaceKind::Sui,
        InterfaceKind::Api,
        InterfaceKind::Internal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InterfaceKind::Cli => "cli",
            InterfaceKind::Tui => "tui",
            InterfaceKind::Sui => "sui",
            InterfaceKind::Api => "api",
            InterfaceKind::Internal => "internal",
        }
    }
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command submitted by a front end. Built once by an adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreRequest {
    /// Wire tag; may name a command the executor does not know.
    pub command: String,
    #[serde(default)]
    pub parameters: DataMap,
    /// Free-form enrichment: original utterance, intent metadata.
    #[serde(default)]
    pub context: DataMap,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    pub interface: InterfaceKind,
}

impl CoreRequest {
    pub fn new(command: impl Into<String>, interface: InterfaceKind) -> Self {
        Self {
            command: command.into(),
            parameters: DataMap::new(),
            context: DataMap::new(),
            session_id: None,
            interface,
        }
    }

    pub fn with_parameter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    pub fn with_session(mut self, session_id: Option<SessionId>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Non-blank string parameter.
    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseKind {
    Success,
    Error,
    /// The process is shutting down and did not execute the request.
    Quit,
}

/// Exactly one of these is produced per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreResponse {
    pub kind: ResponseKind,
    pub status: String,
    pub message: String,
    #[serde(default)]
    pub data: DataMap,
}

impl CoreResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: ResponseKind::Success,
            status: "ok".to_string(),
            message: message.into(),
            data: DataMap::new(),
        }
    }

    pub fn error(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ResponseKind::Error,
            status: status.into(),
            message: message.into(),
            data: DataMap::new(),
        }
    }

    pub fn shutting_down() -> Self {
        Self {
            kind: ResponseKind::Quit,
            status: "shutting_down".to_string(),
            message: "L'assistant est en cours d'arrêt.".to_string(),
            data: DataMap::new(),
        }
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn with_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.kind == ResponseKind::Success
    }

    pub fn is_error(&self) -> bool {
        self.kind == ResponseKind::Error
    }

    /// The response confirms that shutdown was requested (QUIT handled), or
    /// the executor refused work because shutdown is under way.
    pub fn is_terminal(&self) -> bool {
        self.kind == ResponseKind::Quit
            || self.data.get("quit").and_then(Value::as_bool) == Some(true)
    }
}
