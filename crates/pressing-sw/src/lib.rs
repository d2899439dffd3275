//! # Pressing Offline Agent
//!
//! Request interception and push notifications for the Pressing web app,
//! running in a background context separate from the page.
//!
//! ## Features
//!
//! - **Versioned cache**: precache at install, evict old generations at activate
//! - **Strategies**: Cache-First, Network-First, Stale-While-Revalidate per request class
//! - **Push**: any payload becomes a renderable notification
//! - **Interaction**: notification clicks focus or open an app window
//! - **Control channel**: `SKIP_WAITING`, `GET_VERSION`, `CLEAR_CACHE`
//!
//! ## Architecture
//!
//! ```text
//! Registration
//!     ├── waiting (Agent)
//!     └── active (Agent) ── dispatch(AgentEvent)
//!             ├── fetch              → StrategyRouter → VersionedCacheStore / Fetcher
//!             ├── push               → PushPayloadNormalizer → NotificationSurfaceController
//!             ├── notificationclick  → InteractionRouter → ClientHost
//!             ├── notificationclose  → close telemetry
//!             └── message            → ControlChannel
//!
//! CacheStorage (shared by every version)
//!     └── Cache (one per version tag)
//!             └── request key → CacheEntry
//! ```

pub mod agent;
pub mod cache;
pub mod clients;
pub mod config;
pub mod control;
pub mod error;
pub mod interaction;
pub mod lifetime;
pub mod notification;
pub mod push;
pub mod registration;
pub mod strategy;

pub use agent::{Agent, AgentEvent, AgentHost, AgentSignal, EventOutcome, Handled, WorkerState};
pub use cache::{Cache, CacheEntry, CacheStorage, SharedCacheStorage, VersionedCacheStore};
pub use clients::{Client, ClientHost, ClientMatchOptions, ClientType, Clients, VisibilityState};
pub use config::{AgentConfig, NotificationDefaults};
pub use control::{ControlChannel, ControlReply, ControlRequest, ReplyPort};
pub use error::{AgentError, CacheError, ClientError, ConfigError, NotificationError};
pub use interaction::{InteractionEvent, InteractionRouter, Navigation, RouteOutcome};
pub use lifetime::EventLifetime;
pub use notification::{NotificationCenter, NotificationSurface, NotificationSurfaceController};
pub use push::{
    NotificationAction, NotificationData, NotificationDescriptor, PushPayload,
    PushPayloadNormalizer,
};
pub use registration::Registration;
pub use strategy::{RequestClass, Strategy, StrategyRouter};

pub use pressing_net::{Destination, Fetcher, Request, Response};
