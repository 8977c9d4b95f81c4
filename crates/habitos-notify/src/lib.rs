//! # Habitos Notify
//!
//! Notification scheduling and dispatch for the Habitos worker.
//!
//! ## Features
//!
//! - **Tag-addressed scheduling**: one pending timer per tag, newest wins
//! - **Prefix cancellation**: cancel whole families of reminders at once
//! - **Immediate fire**: a target time in the past fires right away
//! - **Push dispatch**: inbound push payloads surface directly
//! - **Best-effort delivery**: a failed display is logged and dropped,
//!   never fatal to the worker
//!
//! ## Architecture
//!
//! ```text
//! NotificationScheduler
//!     └── tag → PendingEntry (timer task)
//!             fire    → sink.show() → entry removed
//!             cancel  → timer aborted → entry removed
//!             replace → old timer aborted, new timer inserted
//!
//! PushDispatcher ── {title, options} ──→ sink.show()   (no registry)
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use habitos_common::HabitosError;

pub mod push;
pub mod scheduler;

pub use push::{PushDispatcher, PushMessage};
pub use scheduler::{NotificationScheduler, ScheduleOutcome, SchedulerEvent};

// ==================== Errors ====================

/// Errors that can occur in notification operations.
#[derive(Error, Debug, Clone)]
pub enum NotifyError {
    /// The notification surface refused to display (e.g., permission
    /// revoked). Callers treat this as best-effort and drop.
    #[error("Display rejected: {0}")]
    DisplayRejected(String),

    /// The notification surface is gone entirely.
    #[error("Notification surface unavailable")]
    SurfaceUnavailable,

    /// Scheduling requires a non-empty tag.
    #[error("Invalid tag: {0}")]
    InvalidTag(String),
}

impl From<NotifyError> for HabitosError {
    fn from(err: NotifyError) -> Self {
        HabitosError::notification_with_source("notification operation failed", err)
    }
}

// ==================== Notification ====================

/// Structured display payload attached to a notification.
///
/// `tag` doubles as the OS-level notification identity; the remaining
/// display fields pass through to the notification surface untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOptions {
    /// Caller-chosen key for replace/cancel addressing.
    #[serde(default)]
    pub tag: String,

    /// Body text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// Icon URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// Attached data (click target and friends).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<NotificationData>,

    /// Keep the notification on screen until dismissed.
    #[serde(default)]
    pub require_interaction: bool,

    /// Unrecognized display fields, passed through verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl NotificationOptions {
    /// Create options with only a tag set.
    pub fn tagged(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            body: None,
            icon: None,
            data: None,
            require_interaction: false,
            extra: serde_json::Map::new(),
        }
    }

    /// Set the body text.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the click target URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        let data = self.data.get_or_insert_with(NotificationData::default);
        data.url = Some(url.into());
        self
    }
}

/// Data attached to a notification, surfaced again on click.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationData {
    /// URL to focus or open when the notification is clicked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Anything else the application attached.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A notification ready for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Title line.
    pub title: String,

    /// Display payload.
    pub options: NotificationOptions,
}

impl Notification {
    /// Create a notification.
    pub fn new(title: impl Into<String>, options: NotificationOptions) -> Self {
        Self {
            title: title.into(),
            options,
        }
    }

    /// The addressing tag.
    pub fn tag(&self) -> &str {
        &self.options.tag
    }
}

// ==================== States and outcomes ====================

/// Lifecycle of a scheduled notification.
///
/// `Fired` and `Cancelled` are terminal; the registry entry is removed on
/// either transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationState {
    /// Timer armed, waiting for the target instant.
    Pending,
    /// Timer elapsed and delivery was attempted.
    Fired,
    /// Timer aborted before it elapsed.
    Cancelled,
}

impl NotificationState {
    /// Check if this state is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, NotificationState::Pending)
    }
}

/// Result of a best-effort delivery attempt.
///
/// `Dropped` means the display call failed and the failure was logged and
/// swallowed; it is observable but never propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The surface accepted the notification.
    Delivered,
    /// The surface rejected it; the notification is gone.
    Dropped,
}

impl DeliveryOutcome {
    /// Check for successful delivery.
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

// ==================== Sink seam ====================

/// The OS notification surface, injectable for tests.
pub trait NotificationSink: Send + Sync {
    /// Display a notification. Errors are treated as best-effort drops by
    /// every caller in this crate.
    fn show(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Close a displayed notification by tag.
    fn close(&self, tag: &str);
}

/// Attempt delivery through the sink, logging and swallowing failure.
pub(crate) fn deliver(sink: &dyn NotificationSink, notification: &Notification) -> DeliveryOutcome {
    match sink.show(notification) {
        Ok(()) => {
            tracing::debug!(tag = %notification.tag(), "notification shown");
            DeliveryOutcome::Delivered
        }
        Err(e) => {
            tracing::warn!(tag = %notification.tag(), error = %e, "notification delivery failed; dropping");
            DeliveryOutcome::Dropped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_wire_shape() {
        let json = r#"{
            "tag": "habit-42-morning",
            "body": "Time to stretch",
            "requireInteraction": true,
            "data": { "url": "https://habitos.app/habits/42" },
            "badge": "/icons/badge.png"
        }"#;

        let options: NotificationOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.tag, "habit-42-morning");
        assert_eq!(options.body.as_deref(), Some("Time to stretch"));
        assert!(options.require_interaction);
        assert_eq!(
            options.data.as_ref().unwrap().url.as_deref(),
            Some("https://habitos.app/habits/42")
        );
        // Unknown display fields ride along
        assert!(options.extra.contains_key("badge"));
    }

    #[test]
    fn test_options_defaults() {
        let options: NotificationOptions = serde_json::from_str(r#"{"tag": "t"}"#).unwrap();
        assert!(options.body.is_none());
        assert!(!options.require_interaction);
        assert!(options.extra.is_empty());
    }

    #[test]
    fn test_notification_tag() {
        let notification =
            Notification::new("Stretch", NotificationOptions::tagged("habit-1").with_body("now"));
        assert_eq!(notification.tag(), "habit-1");
    }

    #[test]
    fn test_state_terminality() {
        assert!(!NotificationState::Pending.is_terminal());
        assert!(NotificationState::Fired.is_terminal());
        assert!(NotificationState::Cancelled.is_terminal());
    }

    #[test]
    fn test_delivery_outcome() {
        assert!(DeliveryOutcome::Delivered.is_delivered());
        assert!(!DeliveryOutcome::Dropped.is_delivered());
    }
}
