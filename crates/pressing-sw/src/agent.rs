//! The agent: one deployed version and its event handlers.
//!
//! Every entry point is a discrete event. [`Agent::dispatch`] runs the
//! matching handler, delivers any response, waits for the work the handler
//! registered on its [`EventLifetime`], and reports an [`EventOutcome`].
//! Handler failures are logged and reported; they never escape.

use std::sync::Arc;

use pressing_net::{Fetcher, Request, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStorage, SharedCacheStorage, VersionedCacheStore};
use crate::clients::{ClientHost, Clients};
use crate::config::AgentConfig;
use crate::control::{ControlChannel, ControlReply, ReplyPort};
use crate::error::{AgentError, CacheError, ConfigError};
use crate::interaction::{self, InteractionEvent, InteractionRouter, RouteOutcome};
use crate::lifetime::EventLifetime;
use crate::notification::{NotificationCenter, NotificationSurface, NotificationSurfaceController};
use crate::push::{NotificationData, NotificationDescriptor, PushPayload, PushPayloadNormalizer};
use crate::strategy::StrategyRouter;

// ==================== Types ====================

/// Lifecycle state of one agent version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Constructed, not yet installed.
    #[default]
    Parsed,
    /// Install event running (precache).
    Installing,
    /// Installed, waiting for activation.
    Installed,
    /// Activate event running (eviction).
    Activating,
    /// Active and answering fetches.
    Activated,
    /// Failed to install, or replaced by a newer version.
    Redundant,
}

/// Notifications sent from the agent to its host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentSignal {
    /// Activation finished and clients were claimed.
    Activated { version: String, claimed: usize },
    /// The page asked this version to stop waiting.
    SkipWaitingRequested { version: String },
    /// A tracked notification was closed without a click.
    NotificationClosed { tag: String, kind: Option<String> },
}

/// An event delivered by the host.
#[derive(Debug)]
pub enum AgentEvent {
    Install,
    Activate,
    /// An intercepted request; the answer goes to `respond_to`.
    Fetch {
        request: Request,
        respond_to: Option<oneshot::Sender<Option<Response>>>,
    },
    Push {
        payload: PushPayload,
    },
    NotificationClick {
        tag: String,
        action: Option<String>,
        data: NotificationData,
    },
    NotificationClose {
        tag: String,
        data: NotificationData,
    },
    /// A control message from the page.
    Message {
        message: JsonValue,
        reply_to: Option<ReplyPort>,
    },
    /// Background sync.
    Sync {
        tag: String,
    },
}

impl AgentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AgentEvent::Install => "install",
            AgentEvent::Activate => "activate",
            AgentEvent::Fetch { .. } => "fetch",
            AgentEvent::Push { .. } => "push",
            AgentEvent::NotificationClick { .. } => "notificationclick",
            AgentEvent::NotificationClose { .. } => "notificationclose",
            AgentEvent::Message { .. } => "message",
            AgentEvent::Sync { .. } => "sync",
        }
    }
}

/// What a handled event produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Handled {
    Installed { precached: usize },
    Activated { evicted: Vec<String> },
    /// `status` is `None` when neither cache nor network answered.
    Responded { status: Option<u16>, from_cache: bool },
    Shown { tag: String },
    Routed(RouteOutcome),
    Closed { tracked: bool },
    Replied(Option<ControlReply>),
    Synced,
}

/// Result of one dispatched event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Completed(Handled),
    Failed {
        category: &'static str,
        reason: String,
    },
}

impl EventOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, EventOutcome::Completed(_))
    }
}

impl From<AgentError> for EventOutcome {
    fn from(err: AgentError) -> Self {
        EventOutcome::Failed {
            category: err.category(),
            reason: err.to_string(),
        }
    }
}

// ==================== Host ====================

/// Collaborators provided by the hosting runtime.
#[derive(Clone)]
pub struct AgentHost {
    pub fetcher: Arc<dyn Fetcher>,
    pub clients: Arc<dyn ClientHost>,
    pub notifications: Arc<dyn NotificationSurface>,
    pub caches: SharedCacheStorage,
}

impl AgentHost {
    /// Host with in-memory clients and notifications.
    pub fn new(fetcher: Arc<dyn Fetcher>, caches: SharedCacheStorage) -> Self {
        Self {
            fetcher,
            clients: Arc::new(Clients::new()),
            notifications: Arc::new(NotificationCenter::new()),
            caches,
        }
    }

    pub fn with_clients(mut self, clients: Arc<dyn ClientHost>) -> Self {
        self.clients = clients;
        self
    }

    pub fn with_notifications(mut self, notifications: Arc<dyn NotificationSurface>) -> Self {
        self.notifications = notifications;
        self
    }

    /// Open the cache storage described by `config`: the snapshot when one
    /// is configured, with the store quota applied.
    pub async fn open_storage(config: &AgentConfig) -> Result<SharedCacheStorage, CacheError> {
        let storage = match config.snapshot_path.as_deref() {
            Some(path) => CacheStorage::load_snapshot(path).await?,
            None => CacheStorage::new(),
        };
        Ok(storage.with_quota(config.store_quota_bytes).shared())
    }
}

// ==================== Agent ====================

/// One deployed agent version.
pub struct Agent {
    config: Arc<AgentConfig>,
    state: RwLock<WorkerState>,
    store: VersionedCacheStore,
    strategies: StrategyRouter,
    normalizer: PushPayloadNormalizer,
    notifications: NotificationSurfaceController,
    interactions: InteractionRouter,
    control: ControlChannel,
    fetcher: Arc<dyn Fetcher>,
    clients: Arc<dyn ClientHost>,
    signals: mpsc::UnboundedSender<AgentSignal>,
}

impl Agent {
    /// Build an agent; signals for the host arrive on the returned receiver.
    pub fn new(
        config: AgentConfig,
        host: AgentHost,
    ) -> Result<(Self, mpsc::UnboundedReceiver<AgentSignal>), ConfigError> {
        config.validate()?;
        let config = Arc::new(config);
        let (signals, signals_rx) = mpsc::unbounded_channel();

        let store = VersionedCacheStore::new(config.version_tag.clone(), host.caches)
            .with_snapshot(config.snapshot_path.clone());
        let strategies =
            StrategyRouter::new(store.clone(), Arc::clone(&host.fetcher), &config.api_marker);
        let interactions = InteractionRouter::new(config.origin.clone(), Arc::clone(&host.clients));
        let control = ControlChannel::new(store.clone(), signals.clone());

        let agent = Self {
            normalizer: PushPayloadNormalizer::new(config.notification.clone()),
            notifications: NotificationSurfaceController::new(host.notifications),
            config,
            state: RwLock::new(WorkerState::Parsed),
            store,
            strategies,
            interactions,
            control,
            fetcher: host.fetcher,
            clients: host.clients,
            signals,
        };
        Ok((agent, signals_rx))
    }

    /// The cache version tag this agent owns.
    pub fn version(&self) -> &str {
        self.store.tag()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn store(&self) -> &VersionedCacheStore {
        &self.store
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.control.skip_waiting_requested()
    }

    async fn set_state(&self, state: WorkerState) {
        let mut current = self.state.write().await;
        debug!(version = %self.version(), from = ?*current, to = ?state, "State change");
        *current = state;
    }

    /// Move from `expected` to `next`, or fail without changing anything.
    async fn transition(&self, expected: WorkerState, next: WorkerState) -> Result<(), AgentError> {
        let mut current = self.state.write().await;
        if *current != expected {
            return Err(AgentError::StateError(format!(
                "{} is {:?}, expected {:?}",
                self.version(),
                *current,
                expected
            )));
        }
        debug!(version = %self.version(), from = ?expected, to = ?next, "State change");
        *current = next;
        Ok(())
    }

    /// Mark this version as replaced.
    pub async fn mark_redundant(&self) {
        self.set_state(WorkerState::Redundant).await;
    }

    // ==================== Handlers ====================

    /// Install: precache the manifest. On failure this version is redundant.
    pub async fn install(&self) -> Result<usize, AgentError> {
        self.transition(WorkerState::Parsed, WorkerState::Installing).await?;
        info!(version = %self.version(), "Installing");

        let result = async {
            let manifest = self.config.manifest_urls()?;
            let count = self.store.precache(&manifest, self.fetcher.as_ref()).await?;
            Ok::<_, AgentError>(count)
        }
        .await;

        match result {
            Ok(count) => {
                self.store.persist().await;
                self.set_state(WorkerState::Installed).await;
                Ok(count)
            }
            Err(e) => {
                error!(version = %self.version(), error = %e, "Install failed");
                self.set_state(WorkerState::Redundant).await;
                Err(e)
            }
        }
    }

    /// Activate: evict stale stores, then claim clients.
    pub async fn activate(&self) -> Result<Vec<String>, AgentError> {
        self.transition(WorkerState::Installed, WorkerState::Activating).await?;
        info!(version = %self.version(), "Activating");

        let evicted = match self.store.evict_stale().await {
            Ok(evicted) => evicted,
            Err(e) => {
                error!(version = %self.version(), error = %e, "Activation failed");
                self.set_state(WorkerState::Redundant).await;
                return Err(e.into());
            }
        };
        self.store.persist().await;

        let claimed = match self.clients.claim(self.version()).await {
            Ok(claimed) => claimed,
            Err(e) => {
                warn!(error = %e, "Could not claim clients");
                0
            }
        };

        self.set_state(WorkerState::Activated).await;
        info!(version = %self.version(), evicted = evicted.len(), claimed, "Activated");
        let _ = self.signals.send(AgentSignal::Activated {
            version: self.version().to_string(),
            claimed,
        });
        Ok(evicted)
    }

    /// Answer an intercepted request.
    pub async fn fetch(&self, request: &Request, lifetime: &mut EventLifetime) -> Option<Response> {
        self.strategies.handle(request, lifetime).await
    }

    /// Normalize a push message and show it.
    pub async fn push(&self, payload: &PushPayload) -> Result<NotificationDescriptor, AgentError> {
        let descriptor = self.normalizer.normalize(payload);
        self.notifications.present(&descriptor).await?;
        Ok(descriptor)
    }

    /// Close the clicked notification, then route to its target.
    pub async fn notification_click(&self, event: &InteractionEvent) -> RouteOutcome {
        self.notifications.dismiss(&event.tag).await;
        self.interactions.route(event).await
    }

    /// Record a close when the notification asked for it.
    pub fn notification_close(&self, event: &InteractionEvent) -> bool {
        let tracked = interaction::record_close(event);
        if tracked {
            let _ = self.signals.send(AgentSignal::NotificationClosed {
                tag: event.tag.clone(),
                kind: event.data.kind.clone(),
            });
        }
        tracked
    }

    /// Handle a control message from the page.
    pub async fn message(
        &self,
        message: &JsonValue,
        reply_to: Option<ReplyPort>,
    ) -> Option<ControlReply> {
        self.control.handle(message, reply_to).await
    }

    /// Background sync has nothing to synchronize yet.
    pub fn sync(&self, tag: &str) {
        info!(tag, "Background sync requested, nothing to do");
    }

    // ==================== Dispatch ====================

    /// Run the handler for `event` and wait for everything it started.
    pub async fn dispatch(&self, event: AgentEvent) -> EventOutcome {
        let name = event.name();
        let mut lifetime = EventLifetime::new();

        let outcome = match event {
            AgentEvent::Install => match self.install().await {
                Ok(precached) => EventOutcome::Completed(Handled::Installed { precached }),
                Err(e) => e.into(),
            },
            AgentEvent::Activate => match self.activate().await {
                Ok(evicted) => EventOutcome::Completed(Handled::Activated { evicted }),
                Err(e) => e.into(),
            },
            AgentEvent::Fetch {
                request,
                respond_to,
            } => {
                let response = self.fetch(&request, &mut lifetime).await;
                let handled = Handled::Responded {
                    status: response.as_ref().map(|r| r.status.as_u16()),
                    from_cache: response.as_ref().map(|r| r.from_cache).unwrap_or(false),
                };
                if let Some(respond_to) = respond_to {
                    if respond_to.send(response).is_err() {
                        debug!(url = %request.url, "Fetch responder dropped");
                    }
                }
                EventOutcome::Completed(handled)
            }
            AgentEvent::Push { payload } => match self.push(&payload).await {
                Ok(descriptor) => EventOutcome::Completed(Handled::Shown {
                    tag: descriptor.tag,
                }),
                Err(e) => e.into(),
            },
            AgentEvent::NotificationClick { tag, action, data } => {
                let event = InteractionEvent::new(tag, action, data);
                EventOutcome::Completed(Handled::Routed(self.notification_click(&event).await))
            }
            AgentEvent::NotificationClose { tag, data } => {
                let event = InteractionEvent::new(tag, None, data);
                let tracked = self.notification_close(&event);
                EventOutcome::Completed(Handled::Closed { tracked })
            }
            AgentEvent::Message { message, reply_to } => {
                EventOutcome::Completed(Handled::Replied(self.message(&message, reply_to).await))
            }
            AgentEvent::Sync { tag } => {
                self.sync(&tag);
                EventOutcome::Completed(Handled::Synced)
            }
        };

        let failed = lifetime.settle().await;
        if failed > 0 {
            warn!(event = name, failed, "Event finished with failed background work");
        }
        self.store.persist_if_changed().await;
        if let EventOutcome::Failed { category, reason } = &outcome {
            warn!(event = name, category, reason = %reason, "Event failed");
        }
        outcome
    }
}
