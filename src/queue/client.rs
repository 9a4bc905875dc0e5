// src/queue/client.rs
//! Work-queue client handle
//!
//! Thin client over the queue service. The coordinator opens the `users`
//! and `rooms` queues in write mode and drives enqueue-then-drain once per
//! tick; workers open them read-only and claim/acknowledge items.

use crate::queue::service::{QueueService, QueueState, QueueStats};
use crate::utils::errors::{Result, ServerError};
use std::sync::Arc;

/// Which side of a queue a client holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// Claim and acknowledge items
    Read,
    /// Enqueue items and barrier on the drain
    Write,
}

/// Client handle to one named queue
#[derive(Clone)]
pub struct WorkQueue {
    name: String,
    mode: QueueMode,
    state: Arc<QueueState>,
}

impl WorkQueue {
    /// Open a queue on the given service
    pub fn create(service: &QueueService, name: &str, mode: QueueMode) -> Self {
        Self {
            name: name.to_string(),
            mode,
            state: service.open(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> QueueMode {
        self.mode
    }

    /// Fan out a batch of work items
    pub async fn add_multi(&self, ids: Vec<String>) -> Result<usize> {
        if self.mode != QueueMode::Write {
            return Err(ServerError::QueueReadOnly {
                name: self.name.clone(),
            });
        }
        Ok(self.state.add_multi(ids))
    }

    /// Block until every enqueued item has been acknowledged
    pub async fn when_all_done(&self) -> Result<()> {
        self.state.when_all_done().await;
        Ok(())
    }

    /// Worker side: claim the next pending item
    pub fn fetch(&self) -> Option<String> {
        self.state.fetch()
    }

    /// Worker side: acknowledge a claimed item
    pub fn mark_done(&self, id: &str) -> bool {
        self.state.mark_done(id)
    }

    pub fn stats(&self) -> QueueStats {
        self.state.stats()
    }
}
