// src/pipeline/run.rs
//! Per-invocation tick state

use crate::pipeline::stage::Stage;
use crate::pipeline::watchdog::Watchdog;
use crate::queue::QueueService;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// Options for one `tick` call
#[derive(Default)]
pub struct TickOptions {
    /// Override of the canonical stage sequence
    pub stages: Option<Vec<Stage>>,
}

impl TickOptions {
    /// Run only the given stages, in the given order
    pub fn with_stages(stages: impl Into<Vec<Stage>>) -> Self {
        Self {
            stages: Some(stages.into()),
        }
    }
}

/// Ephemeral state of one tick invocation.
///
/// Owns the watchdog and the shared current-stage cell; dropping the run
/// always disarms the watchdog, so an overridden stage list that omits the
/// terminal stage cannot leak a live timer into the next tick.
pub struct TickRun {
    current: Arc<RwLock<Stage>>,
    watchdog: Watchdog,
}

impl TickRun {
    pub fn new(watchdog_timeout: Duration, queues: Arc<QueueService>) -> Self {
        let current = Arc::new(RwLock::new(Stage::Start));
        let watchdog = Watchdog::arm(watchdog_timeout, Arc::clone(&current), queues);
        Self { current, watchdog }
    }

    pub fn set_stage(&self, stage: Stage) {
        *self.current.write() = stage;
    }

    pub fn current(&self) -> Stage {
        *self.current.read()
    }

    /// Restart the watchdog timer (the `start` stage does this)
    pub fn rearm_watchdog(&mut self) {
        self.watchdog.rearm();
    }

    /// Whether the watchdog fired during this run
    pub fn stalled(&self) -> bool {
        self.watchdog.fired()
    }

    /// Terminal cleanup: cancel the watchdog
    pub fn finish(&mut self) {
        self.watchdog.disarm();
    }
}
