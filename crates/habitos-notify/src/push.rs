//! Inbound push handling.
//!
//! A push payload surfaces directly through the sink. This path is
//! independent of the scheduled-notification registry: no dedup, no
//! tag-based suppression, no timer involved.

use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::{deliver, DeliveryOutcome, Notification, NotificationOptions, NotificationSink};

/// The JSON payload carried by a push event.
#[derive(Debug, Clone, Deserialize)]
pub struct PushMessage {
    /// Title line.
    pub title: String,

    /// Display payload.
    pub options: NotificationOptions,
}

/// Reacts to inbound push payloads by surfacing a notification.
pub struct PushDispatcher {
    sink: Arc<dyn NotificationSink>,
}

impl PushDispatcher {
    /// Create a dispatcher delivering through the given sink.
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Handle a push payload.
    ///
    /// Absent or malformed payloads are ignored: nothing is shown and no
    /// error reaches the push source. Returns the delivery outcome when a
    /// notification was surfaced.
    pub fn handle_push(&self, payload: &[u8]) -> Option<DeliveryOutcome> {
        if payload.is_empty() {
            debug!("push event with empty payload ignored");
            return None;
        }

        let message: PushMessage = match serde_json::from_slice(payload) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "malformed push payload ignored");
                return None;
            }
        };

        let notification = Notification::new(message.title, message.options);
        Some(deliver(self.sink.as_ref(), &notification))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NotifyError;
    use std::sync::Mutex;

    struct RecordingSink {
        shown: Mutex<Vec<Notification>>,
        reject: bool,
    }

    impl RecordingSink {
        fn new(reject: bool) -> Self {
            Self {
                shown: Mutex::new(Vec::new()),
                reject,
            }
        }
    }

    impl NotificationSink for RecordingSink {
        fn show(&self, notification: &Notification) -> Result<(), NotifyError> {
            if self.reject {
                return Err(NotifyError::SurfaceUnavailable);
            }
            self.shown.lock().unwrap().push(notification.clone());
            Ok(())
        }

        fn close(&self, _tag: &str) {}
    }

    #[test]
    fn test_valid_payload_is_shown() {
        let sink = Arc::new(RecordingSink::new(false));
        let dispatcher = PushDispatcher::new(sink.clone());

        let payload = br#"{
            "title": "Streak saved!",
            "options": { "tag": "streak-9", "body": "9 days in a row" }
        }"#;

        let outcome = dispatcher.handle_push(payload);
        assert_eq!(outcome, Some(DeliveryOutcome::Delivered));

        let shown = sink.shown.lock().unwrap();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].title, "Streak saved!");
        assert_eq!(shown[0].tag(), "streak-9");
    }

    #[test]
    fn test_empty_payload_ignored() {
        let sink = Arc::new(RecordingSink::new(false));
        let dispatcher = PushDispatcher::new(sink.clone());

        assert_eq!(dispatcher.handle_push(b""), None);
        assert!(sink.shown.lock().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_payload_ignored() {
        let sink = Arc::new(RecordingSink::new(false));
        let dispatcher = PushDispatcher::new(sink.clone());

        assert_eq!(dispatcher.handle_push(b"{not json"), None);
        assert_eq!(dispatcher.handle_push(br#"{"options": {}}"#), None);
        assert!(sink.shown.lock().unwrap().is_empty());
    }

    #[test]
    fn test_push_without_tag_is_still_shown() {
        // Push notifications are not registry-addressed; a missing tag is fine
        let sink = Arc::new(RecordingSink::new(false));
        let dispatcher = PushDispatcher::new(sink.clone());

        let payload = br#"{ "title": "Hello", "options": {} }"#;
        assert_eq!(dispatcher.handle_push(payload), Some(DeliveryOutcome::Delivered));
    }

    #[test]
    fn test_rejected_display_reports_dropped() {
        let sink = Arc::new(RecordingSink::new(true));
        let dispatcher = PushDispatcher::new(sink);

        let payload = br#"{ "title": "Hi", "options": { "tag": "t" } }"#;
        assert_eq!(dispatcher.handle_push(payload), Some(DeliveryOutcome::Dropped));
    }
}
