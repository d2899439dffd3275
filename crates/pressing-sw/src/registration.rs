//! Host-side view of deployed versions.
//!
//! ```text
//! Registration (scope)
//!     ├── installing (Agent)  precaching
//!     ├── waiting    (Agent)  installed, previous version still active
//!     └── active     (Agent)  answering fetches
//! ```

use std::sync::Arc;

use tracing::{debug, info};
use url::Url;

use crate::agent::{Agent, WorkerState};
use crate::error::AgentError;

/// Installing, waiting and active versions for one scope.
pub struct Registration {
    /// Scope URL.
    pub scope: Url,

    installing: Option<Arc<Agent>>,
    waiting: Option<Arc<Agent>>,
    active: Option<Arc<Agent>>,
}

impl Registration {
    /// Create an empty registration.
    pub fn new(scope: Url) -> Self {
        Self {
            scope,
            installing: None,
            waiting: None,
            active: None,
        }
    }

    pub fn installing(&self) -> Option<&Arc<Agent>> {
        self.installing.as_ref()
    }

    pub fn waiting(&self) -> Option<&Arc<Agent>> {
        self.waiting.as_ref()
    }

    pub fn active(&self) -> Option<&Arc<Agent>> {
        self.active.as_ref()
    }

    /// The version that should receive fetch events.
    pub fn controller(&self) -> Option<&Arc<Agent>> {
        self.active.as_ref()
    }

    /// Install `agent` as the next version.
    ///
    /// A failed install leaves the active version serving. A successful one
    /// waits, unless nothing is active yet or the agent already asked to
    /// skip waiting, in which case it is activated right away.
    pub async fn update(&mut self, agent: Arc<Agent>) -> Result<(), AgentError> {
        info!(scope = %self.scope, version = %agent.version(), "Update found");
        self.installing = Some(Arc::clone(&agent));
        let installed = agent.install().await;
        self.installing = None;
        installed?;

        if let Some(previous) = self.waiting.replace(Arc::clone(&agent)) {
            debug!(version = %previous.version(), "Superseded waiting version");
            previous.mark_redundant().await;
        }

        if self.active.is_none() || agent.skip_waiting_requested() {
            self.activate().await?;
        }
        Ok(())
    }

    /// Activate the waiting version; the previous active one is retired.
    ///
    /// If activation fails the previous version keeps serving.
    pub async fn activate(&mut self) -> Result<(), AgentError> {
        let Some(agent) = self.waiting.take() else {
            return Err(AgentError::StateError("no waiting version".to_string()));
        };
        agent.activate().await?;

        if let Some(old) = self.active.replace(agent) {
            old.mark_redundant().await;
            info!(version = %old.version(), "Previous version retired");
        }
        Ok(())
    }

    /// Force the waiting version to activate without waiting for clients to
    /// close. Returns whether anything was promoted.
    pub async fn skip_waiting(&mut self) -> Result<bool, AgentError> {
        if self.waiting.is_none() {
            return Ok(false);
        }
        self.activate().await?;
        Ok(true)
    }

    /// Promote the waiting version if the page asked it to skip waiting.
    pub async fn promote_if_requested(&mut self) -> Result<bool, AgentError> {
        match &self.waiting {
            Some(agent) if agent.skip_waiting_requested() => self.skip_waiting().await,
            _ => Ok(false),
        }
    }

    /// Retire every version.
    pub async fn unregister(&mut self) {
        for agent in [self.active.take(), self.waiting.take(), self.installing.take()]
            .into_iter()
            .flatten()
        {
            if agent.state().await != WorkerState::Redundant {
                agent.mark_redundant().await;
            }
        }
    }
}
