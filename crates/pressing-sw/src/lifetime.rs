//! Explicit event lifetime extension.
//!
//! A handler that starts work which must outlive its immediate return (a
//! background cache refresh, for example) registers it with
//! [`EventLifetime::wait_until`]. The dispatcher only considers the event
//! handled once [`EventLifetime::settle`] has joined every registered task.

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// Tasks an event must wait for before it is finished.
#[derive(Debug, Default)]
pub struct EventLifetime {
    pending: Vec<JoinHandle<()>>,
}

impl EventLifetime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `task` now and keep the event alive until it completes.
    pub fn wait_until<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.pending.push(tokio::spawn(task));
    }

    /// Number of registered tasks.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Join every registered task.
    ///
    /// Returns how many tasks panicked or were cancelled; those are logged
    /// and otherwise ignored.
    pub async fn settle(self) -> usize {
        let total = self.pending.len();
        let mut failed = 0;
        for handle in self.pending {
            if let Err(e) = handle.await {
                warn!(error = %e, "Lifetime extension task did not complete");
                failed += 1;
            }
        }
        trace!(total, failed, "Event lifetime settled");
        failed
    }
}
