// src/store/pubsub.rs
//! Named broadcast channels
//!
//! Publishing to a channel with no subscribers is a no-op; subscribers that
//! fall behind see lagged errors from the underlying broadcast receiver.

use dashmap::DashMap;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// Well-known channel names
pub mod channels {
    /// A tick has begun
    pub const TICK_STARTED: &str = "tick_started";
    /// A pipeline stage is entered; payload is the stage name
    pub const TICK_STAGE: &str = "tick_stage";
    /// Per-room processing is complete; payload is the new game time
    pub const ROOMS_DONE: &str = "rooms_done";

    /// Per-user console channel
    pub fn user_console(user_id: &str) -> String {
        format!("user:{user_id}/console")
    }
}

/// Publish/subscribe over named channels
#[derive(Default)]
pub struct PubSub {
    senders: DashMap<String, broadcast::Sender<String>>,
}

impl PubSub {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.senders
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Subscribe to a channel, creating it if needed
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        self.sender(channel).subscribe()
    }

    /// Publish a message; returns the number of subscribers that saw it
    pub fn publish(&self, channel: &str, message: impl Into<String>) -> usize {
        self.sender(channel).send(message.into()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let pubsub = PubSub::new();
        let mut rx = pubsub.subscribe("tick_started");
        assert_eq!(pubsub.publish("tick_started", "1"), 1);
        assert_eq!(rx.recv().await.unwrap(), "1");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let pubsub = PubSub::new();
        assert_eq!(pubsub.publish("nobody", "msg"), 0);
    }
}
