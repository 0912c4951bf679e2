//! Shared test harness for the integration tests.
//!
//! Wires the two handler registries the way `main` does — sharing one
//! `ShadowStore` between the device-to-cloud transformer and the
//! shadow state mirror — and routes messages through the real router
//! code into mock channels, one per outbound connection.

use std::sync::Arc;

use sb_connector::bus::{self, HandlerRegistry};
use sb_connector::handlers::{
    CommandRequestHandler, DeviceHandler, InboundMessage, MessageHandler, ShadowStateHandler,
    ShadowStore,
};
use sb_connector::router;
use sb_connector::settings::BridgeSettings;
use sb_mqtt_channel::{MockChannel, PublishedMessage};

pub struct Bridge {
    pub store: Arc<ShadowStore>,
    pub device_bus: HandlerRegistry,
    pub cloud_bus: HandlerRegistry,
    /// Receives what the bridge publishes toward AWS.
    pub cloud: Arc<MockChannel>,
    /// Receives what the bridge publishes toward the local broker.
    pub local: Arc<MockChannel>,
}

impl Bridge {
    /// A bridge for device `test:device` in tenant `test-tenant-id`.
    pub fn new() -> Self {
        Self::with_settings(settings())
    }

    pub fn with_settings(settings: BridgeSettings) -> Self {
        let store = Arc::new(ShadowStore::new());

        let device_handlers: Vec<Box<dyn MessageHandler>> =
            vec![Box::new(DeviceHandler::new(store.clone()))];
        let cloud_handlers: Vec<Box<dyn MessageHandler>> = vec![
            Box::new(ShadowStateHandler::new(store.clone())),
            Box::new(CommandRequestHandler::new()),
        ];

        Self {
            store,
            device_bus: bus::register_handlers(&settings, device_handlers),
            cloud_bus: bus::register_handlers(&settings, cloud_handlers),
            cloud: Arc::new(MockChannel::new()),
            local: Arc::new(MockChannel::new()),
        }
    }

    /// Publish a payload on a local topic and collect what lands on the
    /// AWS connection.
    pub async fn publish_local(&self, topic: &str, payload: &str) -> Vec<PublishedMessage> {
        let msg = InboundMessage {
            topic: topic.to_string(),
            payload: payload.as_bytes().to_vec(),
        };
        router::route_message("device-to-cloud", &self.device_bus, &msg, self.cloud.as_ref())
            .await;
        self.cloud.drain()
    }

    /// Deliver a message from AWS and collect what lands on the local
    /// broker connection.
    pub async fn publish_cloud(&self, topic: &str, payload: &str) -> Vec<PublishedMessage> {
        let msg = InboundMessage {
            topic: topic.to_string(),
            payload: payload.as_bytes().to_vec(),
        };
        router::route_message("cloud-to-device", &self.cloud_bus, &msg, self.local.as_ref())
            .await;
        self.local.drain()
    }

    /// Simulate AWS accepting an update the bridge just published.
    pub async fn accept_update(&self, update: &PublishedMessage) {
        let msg = InboundMessage {
            topic: format!("{}/accepted", update.topic),
            payload: update.payload.clone(),
        };
        router::route_message("cloud-to-device", &self.cloud_bus, &msg, self.local.as_ref())
            .await;
        assert!(
            self.local.drain().is_empty(),
            "mirror must not produce messages"
        );
    }

    /// The mirror's view of one shadow.
    pub fn store_state(&self, shadow_id: &str) -> Option<serde_json::Value> {
        use sb_connector::handlers::ShadowStateReader;
        self.store.current_state(shadow_id)
    }
}

pub fn settings() -> BridgeSettings {
    let mut settings = BridgeSettings {
        tenant_id: "test-tenant-id".to_string(),
        ..Default::default()
    };
    settings.device_id = "test:device".to_string();
    settings
}

pub fn payload_str(msg: &PublishedMessage) -> String {
    String::from_utf8(msg.payload.clone()).unwrap()
}
