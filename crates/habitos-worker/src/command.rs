//! The inbound command channel.
//!
//! The hosting page posts JSON messages of the shape
//! `{ "type": "...", "payload": { ... } }`. The channel is a closed set of
//! command kinds, decoded and validated here at the boundary; unknown or
//! malformed messages are rejected with a typed error instead of falling
//! through silently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use habitos_common::HabitosError;
use habitos_notify::NotificationOptions;

// ==================== Errors ====================

/// Errors produced while decoding an inbound command.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Command is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Command has no \"type\" field")]
    MissingType,

    #[error("Unknown command type: {0}")]
    UnknownType(String),

    #[error("Invalid {command} payload: {message}")]
    InvalidPayload { command: String, message: String },
}

impl From<CommandError> for HabitosError {
    fn from(err: CommandError) -> Self {
        HabitosError::command_with_source("command rejected", err)
    }
}

// ==================== Commands ====================

/// A decoded command from the hosting page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum WorkerCommand {
    /// Schedule (or replace) a tag-addressed notification.
    #[serde(rename = "SCHEDULE_NOTIFICATION", rename_all = "camelCase")]
    ScheduleNotification {
        title: String,
        options: NotificationOptions,
        notify_at: DateTime<Utc>,
    },

    /// Cancel every pending notification whose tag starts with `tag`.
    #[serde(rename = "CANCEL_NOTIFICATIONS")]
    CancelNotifications { tag: String },

    /// Activate a waiting worker version immediately.
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
}

impl WorkerCommand {
    const KNOWN_TYPES: [&'static str; 3] = [
        "SCHEDULE_NOTIFICATION",
        "CANCEL_NOTIFICATIONS",
        "SKIP_WAITING",
    ];

    /// Decode a raw message from the command channel.
    pub fn decode(raw: &[u8]) -> Result<Self, CommandError> {
        let value: serde_json::Value =
            serde_json::from_slice(raw).map_err(|e| CommandError::InvalidJson(e.to_string()))?;

        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(CommandError::MissingType)?
            .to_string();

        if !Self::KNOWN_TYPES.contains(&kind.as_str()) {
            return Err(CommandError::UnknownType(kind));
        }

        serde_json::from_value(value).map_err(|e| CommandError::InvalidPayload {
            command: kind,
            message: e.to_string(),
        })
    }

    /// Encode a command to its wire shape.
    pub fn encode(&self) -> Result<Vec<u8>, CommandError> {
        serde_json::to_vec(self).map_err(|e| CommandError::InvalidJson(e.to_string()))
    }
}
