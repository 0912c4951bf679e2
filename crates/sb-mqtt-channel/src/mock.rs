//! In-memory `Channel` for testing routing without a broker.
//!
//! Stands in for both bridge connections: a test drives messages
//! through the router and asserts on the exact shadow and event topics
//! that land here. Publishes accumulate until read or drained, so one
//! channel can serve a multi-step scenario (publish, accept, publish
//! again).

use async_trait::async_trait;
use rumqttc::QoS;
use std::sync::Mutex;

use crate::channel::Channel;
use crate::error::MqttResult;

/// One recorded publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// `Channel` implementation backed by in-memory logs.
#[derive(Debug, Default)]
pub struct MockChannel {
    published: Mutex<Vec<PublishedMessage>>,
    subscriptions: Mutex<Vec<String>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// All publishes recorded so far, in order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    /// The publishes that went to one exact topic.
    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Take every recorded publish, leaving the log empty.
    pub fn drain(&self) -> Vec<PublishedMessage> {
        std::mem::take(&mut *self.published.lock().unwrap())
    }

    /// Whether a subscription was issued for the filter.
    pub fn is_subscribed_to(&self, filter: &str) -> bool {
        self.subscriptions.lock().unwrap().iter().any(|f| f == filter)
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn publish(&self, topic: &str, payload: &[u8], _qos: QoS) -> MqttResult<()> {
        self.published.lock().unwrap().push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }

    async fn subscribe(&self, filter: &str, _qos: QoS) -> MqttResult<()> {
        self.subscriptions.lock().unwrap().push(filter.to_string());
        Ok(())
    }
}
