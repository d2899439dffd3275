//! Notification surface.
//!
//! Notifications are keyed by tag: showing a descriptor whose tag is
//! already on screen replaces the old one instead of stacking.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::NotificationError;
use crate::push::NotificationDescriptor;

/// Host-side notification display.
#[async_trait]
pub trait NotificationSurface: Send + Sync {
    /// Show `descriptor`, replacing any notification with the same tag.
    async fn show(&self, descriptor: &NotificationDescriptor) -> Result<(), NotificationError>;

    /// Remove the notification with `tag`; returns whether one was shown.
    async fn close(&self, tag: &str) -> Result<bool, NotificationError>;
}

/// In-memory [`NotificationSurface`].
#[derive(Debug, Default)]
pub struct NotificationCenter {
    shown: RwLock<Vec<NotificationDescriptor>>,
    denied: bool,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A surface where the user refused notification permission.
    pub fn denied() -> Self {
        Self {
            shown: RwLock::default(),
            denied: true,
        }
    }

    /// Notifications currently on screen, oldest first.
    pub async fn displayed(&self) -> Vec<NotificationDescriptor> {
        self.shown.read().await.clone()
    }
}

#[async_trait]
impl NotificationSurface for NotificationCenter {
    async fn show(&self, descriptor: &NotificationDescriptor) -> Result<(), NotificationError> {
        if self.denied {
            return Err(NotificationError::PermissionDenied);
        }
        let mut shown = self.shown.write().await;
        shown.retain(|n| n.tag != descriptor.tag);
        shown.push(descriptor.clone());
        Ok(())
    }

    async fn close(&self, tag: &str) -> Result<bool, NotificationError> {
        let mut shown = self.shown.write().await;
        let before = shown.len();
        shown.retain(|n| n.tag != tag);
        Ok(shown.len() != before)
    }
}

/// Presents normalized descriptors. Failures are reported, never retried.
#[derive(Clone)]
pub struct NotificationSurfaceController {
    surface: Arc<dyn NotificationSurface>,
}

impl NotificationSurfaceController {
    pub fn new(surface: Arc<dyn NotificationSurface>) -> Self {
        Self { surface }
    }

    pub async fn present(&self, descriptor: &NotificationDescriptor) -> Result<(), NotificationError> {
        match self.surface.show(descriptor).await {
            Ok(()) => {
                info!(tag = %descriptor.tag, title = %descriptor.title, "Notification shown");
                Ok(())
            }
            Err(e) => {
                warn!(tag = %descriptor.tag, error = %e, "Notification could not be shown");
                Err(e)
            }
        }
    }

    /// Close the notification with `tag`. Closing one that is already gone
    /// is not an error.
    pub async fn dismiss(&self, tag: &str) {
        match self.surface.close(tag).await {
            Ok(true) => debug!(tag, "Notification closed"),
            Ok(false) => debug!(tag, "Notification already gone"),
            Err(e) => warn!(tag, error = %e, "Notification close failed"),
        }
    }
}
