//! MQTT channel — async client wrapper used for both bridge sides.
//!
//! Wraps `rumqttc::AsyncClient` behind the `Channel` trait so the
//! routing layer can publish and subscribe without caring whether it
//! talks to the local broker, AWS IoT Core, or a test mock.

use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};

use crate::config::ConnectionConfig;
use crate::error::{MqttError, MqttResult};
use crate::tls;

/// Abstraction for MQTT message publishing and subscribing.
///
/// Enables mocking in tests without a real MQTT broker.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Publish a raw payload to a topic.
    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> MqttResult<()>;

    /// Subscribe to a topic filter.
    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()>;
}

/// MQTT channel connected to one broker.
///
/// Owns the `AsyncClient` for publishing/subscribing. The `EventLoop`
/// is returned separately from `connect()` — the caller must drive it
/// in a spawned task via `eventloop.poll()`.
pub struct MqttChannel {
    client: AsyncClient,
}

impl MqttChannel {
    /// Create a channel from a connection profile.
    ///
    /// TLS is enabled when the profile carries a CA certificate path;
    /// username/password credentials are applied when present.
    pub fn connect(config: &ConnectionConfig) -> MqttResult<(Self, EventLoop)> {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(std::time::Duration::from_secs(config.keepalive_secs.into()));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        if config.uses_tls() {
            options.set_transport(tls::load_tls_transport(config)?);
        }

        let (client, eventloop) = AsyncClient::new(options, 64);
        Ok((Self { client }, eventloop))
    }
}

#[async_trait]
impl Channel for MqttChannel {
    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> MqttResult<()> {
        self.client
            .publish(topic, qos, false, payload)
            .await
            .map_err(|e| MqttError::Publish(e.to_string()))
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()> {
        self.client
            .subscribe(filter, qos)
            .await
            .map_err(|e| MqttError::Subscribe(e.to_string()))
    }
}
