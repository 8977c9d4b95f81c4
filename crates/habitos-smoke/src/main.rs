//! Habitos Smoke Harness
//!
//! Boots a notification worker with in-memory seams and drives the full
//! surface: install (with one injected network failure to exercise the
//! host's retry), activation with a stale cache, the command channel,
//! fetch interception, push payloads, and notification clicks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use tracing::{info, warn};

use habitos_cache::{
    AssetFetcher, AssetRequest, AssetResponse, CacheError, ResponseKind,
};
use habitos_common::{init_logging, LogConfig};
use habitos_notify::{Notification, NotificationOptions, NotificationSink, NotifyError};
use habitos_worker::{HabitWorker, WorkerCommand, WorkerConfig, WorkerEvent};

/// Serves the app's static assets from memory, failing the first
/// `fail_first` fetches to simulate a flaky network during install.
struct StaticSite {
    routes: Mutex<HashMap<String, Vec<u8>>>,
    fail_remaining: AtomicUsize,
    hits: AtomicUsize,
}

impl StaticSite {
    fn new(config: &WorkerConfig, fail_first: usize) -> anyhow::Result<Self> {
        let mut routes = HashMap::new();
        for url in config.manifest_urls()? {
            routes.insert(url.clone(), format!("asset:{url}").into_bytes());
        }
        routes.insert(
            "https://habitos.app/sounds/chime.mp3".to_string(),
            b"chime".to_vec(),
        );

        Ok(Self {
            routes: Mutex::new(routes),
            fail_remaining: AtomicUsize::new(fail_first),
            hits: AtomicUsize::new(0),
        })
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl AssetFetcher for StaticSite {
    fn fetch(&self, request: AssetRequest) -> BoxFuture<'static, Result<AssetResponse, CacheError>> {
        self.hits.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        let url = request.url.to_string();
        let body = self.routes.lock().unwrap().get(&url).cloned();

        Box::pin(async move {
            if failing {
                return Err(CacheError::Network("simulated outage".into()));
            }
            match body {
                Some(body) => {
                    Ok(AssetResponse::new(&url, 200, ResponseKind::Basic).with_body(body))
                }
                None => Ok(AssetResponse::new(&url, 404, ResponseKind::Basic)),
            }
        })
    }
}

/// Notification surface that logs every display and close call.
struct DesktopSink {
    shown: AtomicUsize,
}

impl DesktopSink {
    fn new() -> Self {
        Self {
            shown: AtomicUsize::new(0),
        }
    }

    fn shown(&self) -> usize {
        self.shown.load(Ordering::SeqCst)
    }
}

impl NotificationSink for DesktopSink {
    fn show(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.shown.fetch_add(1, Ordering::SeqCst);
        info!(
            title = %notification.title,
            tag = %notification.tag(),
            body = notification.options.body.as_deref().unwrap_or(""),
            "notification shown"
        );
        Ok(())
    }

    fn close(&self, tag: &str) {
        info!(tag = %tag, "notification closed");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(LogConfig::default().with_filter("habitos=debug,habitos_smoke=info"));

    let config = WorkerConfig::default();
    let site = Arc::new(StaticSite::new(&config, 1)?);
    let sink = Arc::new(DesktopSink::new());

    let (worker, mut events) = HabitWorker::new(
        config,
        Arc::clone(&site) as Arc<dyn AssetFetcher>,
        Arc::clone(&sink) as Arc<dyn NotificationSink>,
    )?;

    // A page the user already has open
    let window = worker.register_window("https://habitos.app/habits/42").await?;
    info!(window = %window.id, "pre-opened window registered");

    // Install survives the simulated outage thanks to host retries
    worker.install_with_retry().await?;

    // A cache from the previous deploy, pruned on activation
    worker.cache().open_cache("habitos-v0").await;
    let deleted = worker.activate().await;
    info!(?deleted, "activation pruned stale caches");

    // Command channel: immediate fire, scheduled fire, replace, cancel
    let past = WorkerCommand::ScheduleNotification {
        title: "Habitos".to_string(),
        options: NotificationOptions::tagged("habit-42-overdue").with_body("You missed 07:00"),
        notify_at: Utc::now() - chrono::Duration::minutes(5),
    };
    worker.handle_message(&past.encode()?).await?;

    let soon = WorkerCommand::ScheduleNotification {
        title: "Habitos".to_string(),
        options: NotificationOptions::tagged("habit-42-morning")
            .with_body("Time to stretch")
            .with_url("https://habitos.app/habits/42"),
        notify_at: Utc::now() + chrono::Duration::milliseconds(200),
    };
    worker.handle_message(&soon.encode()?).await?;

    // Replace: the 200ms reminder above is superseded by this one
    let replacement = WorkerCommand::ScheduleNotification {
        title: "Habitos".to_string(),
        options: NotificationOptions::tagged("habit-42-morning")
            .with_body("Time to stretch (rescheduled)")
            .with_url("https://habitos.app/habits/42"),
        notify_at: Utc::now() + chrono::Duration::milliseconds(300),
    };
    worker.handle_message(&replacement.encode()?).await?;

    let doomed = WorkerCommand::ScheduleNotification {
        title: "Habitos".to_string(),
        options: NotificationOptions::tagged("water-1-noon").with_body("Drink up"),
        notify_at: Utc::now() + chrono::Duration::seconds(30),
    };
    worker.handle_message(&doomed.encode()?).await?;

    let cancel = WorkerCommand::CancelNotifications {
        tag: "water-".to_string(),
    };
    worker.handle_message(&cancel.encode()?).await?;
    info!(pending = ?worker.pending_notifications().await, "after cancel");

    // A malformed command is rejected, not silently dropped
    if let Err(e) = worker.handle_message(b"{ \"type\": \"MAKE_COFFEE\" }").await {
        warn!(error = %e, "rejected command");
    }

    // Fetch interception: manifest hit, then an uncached asset
    let cached = worker
        .handle_fetch(AssetRequest::get_str("https://habitos.app/app.js")?)
        .await?;
    info!(from_cache = cached.from_cache, "fetched app.js");

    let chime = worker
        .handle_fetch(AssetRequest::get_str("https://habitos.app/sounds/chime.mp3")?)
        .await?;
    info!(from_cache = chime.from_cache, "fetched chime.mp3 (populates cache)");

    // Push path
    worker.handle_push(br#"{ "title": "Streak!", "options": { "tag": "streak-10", "body": "10 days" } }"#);
    worker.handle_push(b"not json at all");

    // Let the rescheduled reminder fire
    tokio::time::sleep(Duration::from_millis(500)).await;

    // Clicks: focus the open habit page, then open the app root
    let focused = worker
        .handle_notification_click("habit-42-morning", Some("https://habitos.app/habits/42"))
        .await;
    info!(?focused, "click on habit reminder");

    let opened = worker.handle_notification_click("streak-10", None).await;
    info!(?opened, "click on streak notification");

    while let Ok(event) = events.try_recv() {
        match event {
            WorkerEvent::NotificationFired { tag, outcome } => {
                info!(tag = %tag, ?outcome, "event: notification fired")
            }
            other => info!(event = ?other, "event"),
        }
    }

    info!(
        notifications_shown = sink.shown(),
        network_fetches = site.hits(),
        windows = worker.window_count().await,
        "smoke run complete"
    );

    Ok(())
}
