//! Queued commands and their results
//!
//! Queue payloads are JSON records `{"id": "...", "type": n, "time": n}`.
//! They are validated once, here, into a [`Command`]; nothing downstream
//! sees the loose record.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::HEATER_DURATION_RANGE;

/// Wire record as produced by the backend and the status monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(rename = "type")]
    kind: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time: Option<i64>,
}

/// What the session should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// type -1
    Delete,
    /// type 0
    HeaterOff,
    /// type 1
    HeaterOn { duration: u8 },
    /// type 2
    Heartbeat,
    /// type 4
    ReadClimate,
    /// type 6
    CheckStatus,
    /// type 7
    ReadPotion,
}

impl CommandKind {
    pub fn type_code(&self) -> i64 {
        match self {
            Self::Delete => -1,
            Self::HeaterOff => 0,
            Self::HeaterOn { .. } => 1,
            Self::Heartbeat => 2,
            Self::ReadClimate => 4,
            Self::CheckStatus => 6,
            Self::ReadPotion => 7,
        }
    }
}

/// A validated command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Result key; background commands have none and never post a result
    pub id: Option<String>,
    pub kind: CommandKind,
}

/// Why a queued payload was refused before any device I/O
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("malformed command: {0}")]
    Malformed(String),

    #[error("unknown command type {0}")]
    UnknownType(i64),

    #[error("heater duration missing")]
    MissingDuration,

    #[error("heater duration {0} outside 1..=8")]
    DurationOutOfRange(i64),
}

/// A refused payload, with the id if one could be read so a result can be posted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedCommand {
    pub id: Option<String>,
    pub error: CommandError,
}

impl Command {
    pub fn new(kind: CommandKind) -> Self {
        Self { id: None, kind }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Parse and validate one queue payload
    pub fn from_json(payload: &str) -> Result<Self, RejectedCommand> {
        let value: serde_json::Value =
            serde_json::from_str(payload).map_err(|e| RejectedCommand {
                id: None,
                error: CommandError::Malformed(e.to_string()),
            })?;

        let id = value
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let raw: RawCommand = serde_json::from_value(value).map_err(|e| RejectedCommand {
            id: id.clone(),
            error: CommandError::Malformed(e.to_string()),
        })?;

        Self::validate(raw).map_err(|error| RejectedCommand { id, error })
    }

    fn validate(raw: RawCommand) -> Result<Self, CommandError> {
        let kind = match raw.kind {
            -1 => CommandKind::Delete,
            0 => CommandKind::HeaterOff,
            1 => {
                let time = raw.time.ok_or(CommandError::MissingDuration)?;
                let duration = u8::try_from(time)
                    .ok()
                    .filter(|d| HEATER_DURATION_RANGE.contains(d))
                    .ok_or(CommandError::DurationOutOfRange(time))?;
                CommandKind::HeaterOn { duration }
            },
            2 => CommandKind::Heartbeat,
            4 => CommandKind::ReadClimate,
            6 => CommandKind::CheckStatus,
            7 => CommandKind::ReadPotion,
            // 3 and 5 are reserved
            other => return Err(CommandError::UnknownType(other)),
        };
        Ok(Self { id: raw.id, kind })
    }

    /// Encode back to the queue format
    pub fn to_json(&self) -> String {
        let raw = RawCommand {
            id: self.id.clone(),
            kind: self.kind.type_code(),
            time: match self.kind {
                CommandKind::HeaterOn { duration } => Some(i64::from(duration)),
                _ => None,
            },
        };
        // Serializing a plain struct of strings and integers cannot fail
        serde_json::to_string(&raw).unwrap_or_default()
    }
}

/// Result posted back on the per-command result list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// 0 success, 1 failure
    pub code: u8,
    pub msg: String,
}

impl CommandResult {
    pub fn success(msg: impl Into<String>) -> Self {
        Self {
            code: 0,
            msg: msg.into(),
        }
    }

    pub fn failure(msg: impl Into<String>) -> Self {
        Self {
            code: 1,
            msg: msg.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}
