//! The scheduled-notification registry.
//!
//! An explicitly owned map from tag to pending timer. All mutation paths
//! (schedule, cancel, fire-then-delete) take the registry's write lock, so
//! the two invariants hold under a multi-threaded runtime: at most one
//! pending timer per tag, and the newest `schedule` call for a tag always
//! wins.

use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

use crate::{
    deliver, DeliveryOutcome, Notification, NotificationSink, NotificationState, NotifyError,
};

// ==================== Types ====================

/// Result of a `schedule` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// A timer is armed; the tag is pending.
    Scheduled,
    /// The target instant had already passed; delivery was attempted on the
    /// spot and no registry entry was created.
    FiredImmediately(DeliveryOutcome),
}

/// Terminal transition of a scheduled notification, for observability.
#[derive(Debug, Clone)]
pub struct SchedulerEvent {
    /// The notification's tag.
    pub tag: String,

    /// The terminal state reached.
    pub state: NotificationState,

    /// Delivery result when the state is `Fired`.
    pub outcome: Option<DeliveryOutcome>,
}

/// A pending timer, keyed by tag in the registry.
#[derive(Debug)]
struct PendingEntry {
    /// Distinguishes this timer from a replacement under the same tag.
    generation: u64,

    /// Target instant.
    notify_at: Instant,

    /// The armed timer task.
    handle: JoinHandle<()>,
}

fn next_generation() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

// ==================== Scheduler ====================

/// Tag-addressed notification scheduler.
///
/// Owns the registry for the worker's lifetime; state does not survive a
/// worker restart (accepted limitation, not a bug).
pub struct NotificationScheduler {
    /// tag → pending timer.
    entries: Arc<RwLock<HashMap<String, PendingEntry>>>,

    /// Notification surface.
    sink: Arc<dyn NotificationSink>,

    /// Terminal-transition events.
    event_tx: mpsc::UnboundedSender<SchedulerEvent>,
}

impl NotificationScheduler {
    /// Create a scheduler delivering through the given sink.
    pub fn new(
        sink: Arc<dyn NotificationSink>,
    ) -> (Self, mpsc::UnboundedReceiver<SchedulerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        (
            Self {
                entries: Arc::new(RwLock::new(HashMap::new())),
                sink,
                event_tx,
            },
            event_rx,
        )
    }

    /// Schedule a notification for the given instant.
    ///
    /// A pending timer under the same tag is aborted and replaced; the
    /// older call is discarded silently. A target instant at or before now
    /// fires immediately and leaves no registry entry, so a later `cancel`
    /// for that tag is a no-op even though the notification was shown.
    pub async fn schedule(
        &self,
        notification: Notification,
        notify_at: Instant,
    ) -> Result<ScheduleOutcome, NotifyError> {
        let tag = notification.tag().to_string();
        if tag.is_empty() {
            return Err(NotifyError::InvalidTag("tag must not be empty".into()));
        }

        let mut entries = self.entries.write().await;

        if let Some(previous) = entries.remove(&tag) {
            previous.handle.abort();
            debug!(tag = %tag, "pending notification replaced");
        }

        let delay = notify_at.saturating_duration_since(Instant::now());
        if delay.is_zero() {
            drop(entries);
            let outcome = deliver(self.sink.as_ref(), &notification);
            let _ = self.event_tx.send(SchedulerEvent {
                tag,
                state: NotificationState::Fired,
                outcome: Some(outcome),
            });
            return Ok(ScheduleOutcome::FiredImmediately(outcome));
        }

        let generation = next_generation();
        let registry = Arc::clone(&self.entries);
        let sink = Arc::clone(&self.sink);
        let event_tx = self.event_tx.clone();
        let task_tag = tag.clone();

        let handle = tokio::spawn(async move {
            sleep_until(notify_at).await;

            let outcome = deliver(sink.as_ref(), &notification);
            let _ = event_tx.send(SchedulerEvent {
                tag: task_tag.clone(),
                state: NotificationState::Fired,
                outcome: Some(outcome),
            });

            // Remove our own entry, unless a replacement raced the fire.
            let mut entries = registry.write().await;
            if entries.get(&task_tag).map(|e| e.generation) == Some(generation) {
                entries.remove(&task_tag);
            }
        });

        trace!(tag = %tag, ?delay, "notification timer armed");
        entries.insert(
            tag,
            PendingEntry {
                generation,
                notify_at,
                handle,
            },
        );

        Ok(ScheduleOutcome::Scheduled)
    }

    /// Cancel every pending notification whose tag starts with `prefix`.
    ///
    /// Idempotent; cancelling tags that do not exist is not an error. A
    /// timer that has already elapsed and begun displaying cannot be
    /// suppressed.
    pub async fn cancel(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write().await;

        let mut cancelled = 0;
        entries.retain(|tag, entry| {
            if tag.starts_with(prefix) {
                entry.handle.abort();
                let _ = self.event_tx.send(SchedulerEvent {
                    tag: tag.clone(),
                    state: NotificationState::Cancelled,
                    outcome: None,
                });
                trace!(tag = %tag, "pending notification cancelled");
                cancelled += 1;
                false
            } else {
                true
            }
        });

        if cancelled > 0 {
            debug!(prefix = %prefix, cancelled, "notifications cancelled by prefix");
        }
        cancelled
    }

    /// Check whether a tag has a pending timer.
    pub async fn is_pending(&self, tag: &str) -> bool {
        self.entries.read().await.contains_key(tag)
    }

    /// All pending tags, sorted.
    pub async fn pending_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.entries.read().await.keys().cloned().collect();
        tags.sort();
        tags
    }

    /// Number of pending timers.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if no timers are pending.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Target instant of a pending tag, if any.
    pub async fn notify_at(&self, tag: &str) -> Option<Instant> {
        self.entries.read().await.get(tag).map(|e| e.notify_at)
    }
}
