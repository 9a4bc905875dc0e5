// src/pipeline/watchdog.rs
//! Tick watchdog
//!
//! Armed for the whole tick and re-armed by the `start` stage. Firing does
//! not abort the in-flight stage handler; it reports the stalled stage,
//! resets every work queue so the next tick is not blocked on items that
//! will never be acknowledged, and poisons the run so the pipeline rejects
//! any late-arriving completion.

use crate::pipeline::stage::Stage;
use crate::queue::QueueService;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::error;

/// Stall detector for one tick
pub struct Watchdog {
    timeout: Duration,
    current: Arc<RwLock<Stage>>,
    queues: Arc<QueueService>,
    fired: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Arm a new watchdog.
    ///
    /// `current` is the shared current-stage cell the pipeline updates; it
    /// names the stalled stage in the report.
    pub fn arm(
        timeout: Duration,
        current: Arc<RwLock<Stage>>,
        queues: Arc<QueueService>,
    ) -> Self {
        let mut watchdog = Self {
            timeout,
            current,
            queues,
            fired: Arc::new(AtomicBool::new(false)),
            task: None,
        };
        watchdog.rearm();
        watchdog
    }

    /// Restart the timer. An earlier fire stays latched.
    pub fn rearm(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let timeout = self.timeout;
        let current = Arc::clone(&self.current);
        let queues = Arc::clone(&self.queues);
        let fired = Arc::clone(&self.fired);
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            fired.store(true, Ordering::SeqCst);
            let stage = *current.read();
            error!(stage = stage.name(), "tick watchdog fired, resetting work queues");
            queues.reset_all();
        }));
    }

    /// Whether the watchdog has fired for this run
    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Cancel the timer
    pub fn disarm(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fire_resets_queues() {
        let queues = Arc::new(QueueService::new());
        let rooms = queues.open("rooms");
        rooms.add_multi(vec!["a".into(), "b".into()]);

        let current = Arc::new(RwLock::new(Stage::WaitForRooms));
        let watchdog = Watchdog::arm(
            Duration::from_millis(30),
            Arc::clone(&current),
            Arc::clone(&queues),
        );

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(watchdog.fired());
        assert_eq!(rooms.stats().pending, 0);
    }

    #[tokio::test]
    async fn test_disarm_before_fire() {
        let queues = Arc::new(QueueService::new());
        let rooms = queues.open("rooms");
        rooms.add_multi(vec!["a".into()]);

        let current = Arc::new(RwLock::new(Stage::Start));
        let mut watchdog = Watchdog::arm(
            Duration::from_millis(50),
            current,
            Arc::clone(&queues),
        );
        watchdog.disarm();

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!watchdog.fired());
        assert_eq!(rooms.stats().pending, 1);
    }

    #[tokio::test]
    async fn test_rearm_restarts_timer_but_keeps_latch() {
        let queues = Arc::new(QueueService::new());
        let current = Arc::new(RwLock::new(Stage::Start));
        let mut watchdog = Watchdog::arm(
            Duration::from_millis(40),
            current,
            Arc::clone(&queues),
        );

        // Rearming within the window postpones the fire.
        tokio::time::sleep(Duration::from_millis(25)).await;
        watchdog.rearm();
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(!watchdog.fired());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(watchdog.fired());
    }
}
