//! # Habitos Worker
//!
//! The notification scheduling worker for the Habitos habit tracker. Runs
//! independently of the hosting page and owns all notification state.
//!
//! ## Features
//!
//! - **Lifecycle**: install (manifest caching), activate (stale-cache
//!   pruning + client claiming), skip-waiting
//! - **Command channel**: typed schedule / cancel / skip-waiting messages
//!   from the hosting page
//! - **Fetch interception**: cache-first asset serving once activated
//! - **Push and click dispatch**: OS notification events handled without
//!   further input from the page
//!
//! ## Architecture
//!
//! ```text
//! hosting page ──commands──→ HabitWorker ←──push/click── OS surface
//!                                │
//!                                ├── AssetCacheManager (install/fetch)
//!                                ├── NotificationScheduler (tag → timer)
//!                                ├── PushDispatcher
//!                                └── Clients (open windows)
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

use habitos_cache::{AssetCacheManager, AssetFetcher, AssetRequest, AssetResponse, CacheManifest};
use habitos_common::{retry_with_backoff, HabitosError, RetryConfig};
use habitos_notify::{
    DeliveryOutcome, Notification, NotificationScheduler, NotificationSink, NotificationState,
    PushDispatcher, ScheduleOutcome,
};

pub mod clients;
pub mod command;
pub mod config;

pub use clients::{Clients, WindowClient};
pub use command::{CommandError, WorkerCommand};
pub use config::{CacheSettings, WorkerConfig};

// ==================== Lifecycle ====================

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerLifecycle {
    /// Constructed, install not yet attempted.
    Idle,
    /// Caching the manifest (install event).
    Installing,
    /// Installed, waiting for activation.
    Installed,
    /// Pruning stale caches and claiming clients (activate event).
    Activating,
    /// Active: intercepting fetches and owning notification state.
    Activated,
}

impl Default for WorkerLifecycle {
    fn default() -> Self {
        Self::Idle
    }
}

impl WorkerLifecycle {
    /// String representation for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerLifecycle::Idle => "idle",
            WorkerLifecycle::Installing => "installing",
            WorkerLifecycle::Installed => "installed",
            WorkerLifecycle::Activating => "activating",
            WorkerLifecycle::Activated => "activated",
        }
    }

    /// Check if the worker controls fetches.
    pub fn is_active(&self) -> bool {
        matches!(self, WorkerLifecycle::Activated)
    }
}

// ==================== Events and outcomes ====================

/// Worker events, for observers on the hosting side.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// Lifecycle transition.
    Lifecycle { state: WorkerLifecycle },
    /// Stale caches removed during activation.
    CachesPruned { deleted: Vec<String> },
    /// A scheduled notification's timer elapsed.
    NotificationFired {
        tag: String,
        outcome: DeliveryOutcome,
    },
    /// Pending notifications cancelled by prefix.
    NotificationsCancelled { prefix: String, cancelled: usize },
    /// An existing window was focused after a notification click.
    WindowFocused { client_id: String },
    /// A new window was opened after a notification click.
    WindowOpened { client_id: String, url: String },
}

/// Result of a dispatched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// A notification was scheduled (or fired on the spot).
    Scheduled(ScheduleOutcome),
    /// Pending notifications were cancelled.
    Cancelled { cancelled: usize },
    /// Skip-waiting was processed.
    SkippedWaiting { activated: bool },
}

/// Result of a notification click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// A window already showing the target URL was focused.
    FocusedExisting { client_id: String },
    /// A new window was opened at the target URL.
    OpenedWindow { client_id: String },
    /// Neither focusing nor opening was possible; the click completed
    /// silently.
    Ignored,
}

// ==================== Worker ====================

/// The notification scheduling worker.
///
/// All state lives in this instance and dies with it; the registry does
/// not survive a restart by the host environment.
pub struct HabitWorker {
    /// Application origin (click-target default).
    origin: Url,

    /// Install retry policy.
    install_retry: RetryConfig,

    /// Lifecycle state.
    lifecycle: Arc<RwLock<WorkerLifecycle>>,

    /// Offline asset cache.
    cache: AssetCacheManager,

    /// Tag-addressed notification registry.
    scheduler: NotificationScheduler,

    /// Push payload handling.
    push: PushDispatcher,

    /// Open application windows.
    clients: Arc<RwLock<Clients>>,

    /// OS notification surface (for closing on click).
    sink: Arc<dyn NotificationSink>,

    /// Event channel to the hosting side.
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl HabitWorker {
    /// Create a worker from config and injected seams.
    pub fn new(
        config: WorkerConfig,
        fetcher: Arc<dyn AssetFetcher>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<WorkerEvent>), HabitosError> {
        let origin = config.origin_url()?;
        let manifest: CacheManifest = config.manifest_urls()?.into_iter().collect();
        let cache = AssetCacheManager::new(&config.cache.version, manifest, fetcher);

        let (scheduler, mut scheduler_rx) = NotificationScheduler::new(Arc::clone(&sink));
        let push = PushDispatcher::new(Arc::clone(&sink));

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        // Surface timer firings on the worker's event channel.
        let forward_tx = event_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = scheduler_rx.recv().await {
                if event.state == NotificationState::Fired {
                    let _ = forward_tx.send(WorkerEvent::NotificationFired {
                        tag: event.tag,
                        outcome: event.outcome.unwrap_or(DeliveryOutcome::Dropped),
                    });
                }
            }
        });

        Ok((
            Self {
                origin,
                install_retry: config.install_retry,
                lifecycle: Arc::new(RwLock::new(WorkerLifecycle::Idle)),
                cache,
                scheduler,
                push,
                clients: Arc::new(RwLock::new(Clients::new())),
                sink,
                event_tx,
            },
            event_rx,
        ))
    }

    /// Application origin.
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Current cache version identifier.
    pub fn version(&self) -> &str {
        self.cache.version()
    }

    /// The offline cache manager.
    pub fn cache(&self) -> &AssetCacheManager {
        &self.cache
    }

    /// Current lifecycle state.
    pub async fn lifecycle(&self) -> WorkerLifecycle {
        *self.lifecycle.read().await
    }

    async fn set_lifecycle(&self, state: WorkerLifecycle) {
        *self.lifecycle.write().await = state;
        info!(state = state.as_str(), "worker lifecycle changed");
        let _ = self.event_tx.send(WorkerEvent::Lifecycle { state });
    }

    // ==================== Lifecycle events ====================

    /// Install: cache every manifest asset.
    ///
    /// Failure propagates and leaves the worker uninstalled; the host
    /// retries until the install succeeds.
    pub async fn install(&self) -> Result<(), HabitosError> {
        self.set_lifecycle(WorkerLifecycle::Installing).await;
        self.cache.install().await?;
        self.set_lifecycle(WorkerLifecycle::Installed).await;
        Ok(())
    }

    /// Install with the host's retry-until-success policy.
    pub async fn install_with_retry(&self) -> Result<(), HabitosError> {
        let retry = self.install_retry.clone();
        retry_with_backoff(&retry, || self.install()).await
    }

    /// Activate: prune stale caches and claim all open windows.
    ///
    /// Returns the pruned cache names.
    pub async fn activate(&self) -> Vec<String> {
        self.set_lifecycle(WorkerLifecycle::Activating).await;

        let deleted = self.cache.activate().await;
        if !deleted.is_empty() {
            let _ = self.event_tx.send(WorkerEvent::CachesPruned {
                deleted: deleted.clone(),
            });
        }

        self.clients.write().await.claim();
        self.set_lifecycle(WorkerLifecycle::Activated).await;
        deleted
    }

    /// Activate immediately if this worker is waiting.
    pub async fn skip_waiting(&self) -> bool {
        let state = self.lifecycle().await;
        if state == WorkerLifecycle::Installed {
            self.activate().await;
            true
        } else {
            debug!(state = state.as_str(), "skip-waiting ignored; no waiting worker");
            false
        }
    }

    // ==================== Inbound channels ====================

    /// Handle a raw message from the hosting page's command channel.
    pub async fn handle_message(&self, raw: &[u8]) -> Result<CommandOutcome, HabitosError> {
        let command = WorkerCommand::decode(raw)?;

        match command {
            WorkerCommand::ScheduleNotification {
                title,
                options,
                notify_at,
            } => {
                // A target in the past clamps to "now" and fires on the spot
                let delay = (notify_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                let when = Instant::now() + delay;
                let outcome = self
                    .scheduler
                    .schedule(Notification::new(title, options), when)
                    .await?;
                Ok(CommandOutcome::Scheduled(outcome))
            }
            WorkerCommand::CancelNotifications { tag } => {
                let cancelled = self.scheduler.cancel(&tag).await;
                let _ = self.event_tx.send(WorkerEvent::NotificationsCancelled {
                    prefix: tag,
                    cancelled,
                });
                Ok(CommandOutcome::Cancelled { cancelled })
            }
            WorkerCommand::SkipWaiting => {
                let activated = self.skip_waiting().await;
                Ok(CommandOutcome::SkippedWaiting { activated })
            }
        }
    }

    /// Handle an intercepted fetch.
    ///
    /// Cache-first once activated; straight to the network before that.
    pub async fn handle_fetch(&self, request: AssetRequest) -> Result<AssetResponse, HabitosError> {
        let response = if self.lifecycle().await.is_active() {
            self.cache.handle_fetch(request).await?
        } else {
            self.cache.passthrough(request).await?
        };
        Ok(response)
    }

    /// Handle an inbound push payload.
    ///
    /// Malformed payloads are ignored; this path never touches the
    /// scheduled-notification registry.
    pub fn handle_push(&self, payload: &[u8]) -> Option<DeliveryOutcome> {
        self.push.handle_push(payload)
    }

    /// Handle a click on a displayed notification.
    ///
    /// Closes the notification, then focuses a window already showing the
    /// target URL or opens a new one. Best-effort: completes silently when
    /// neither is possible.
    pub async fn handle_notification_click(
        &self,
        tag: &str,
        data_url: Option<&str>,
    ) -> ClickOutcome {
        self.sink.close(tag);

        let target = data_url
            .and_then(|u| Url::parse(u).ok())
            .unwrap_or_else(|| self.origin.clone());

        let mut clients = self.clients.write().await;

        if let Some(id) = clients.find_by_url(&target).map(|w| w.id.clone()) {
            if clients.focus(&id).is_ok() {
                let _ = self.event_tx.send(WorkerEvent::WindowFocused {
                    client_id: id.clone(),
                });
                return ClickOutcome::FocusedExisting { client_id: id };
            }
        }

        match clients.open_window(target.as_str()) {
            Ok(window) => {
                let _ = self.event_tx.send(WorkerEvent::WindowOpened {
                    client_id: window.id.clone(),
                    url: window.url.to_string(),
                });
                ClickOutcome::OpenedWindow {
                    client_id: window.id,
                }
            }
            Err(e) => {
                debug!(error = %e, "notification click could not open a window");
                ClickOutcome::Ignored
            }
        }
    }

    // ==================== Host integration ====================

    /// Register a window the host already has open.
    pub async fn register_window(&self, url: &str) -> Result<WindowClient, HabitosError> {
        let url = Url::parse(url)
            .map_err(|e| HabitosError::config_with_source(format!("invalid window URL {url}"), e))?;
        Ok(self.clients.write().await.register(url))
    }

    /// Number of open windows.
    pub async fn window_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Tags with a pending timer, sorted.
    pub async fn pending_notifications(&self) -> Vec<String> {
        self.scheduler.pending_tags().await
    }
}
