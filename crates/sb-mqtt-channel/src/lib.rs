//! MQTT channel layer for the ShadowBridge connector.
//!
//! Provides a thin typed abstraction over `rumqttc`:
//! - `Channel` trait for publish/subscribe (mockable in tests)
//! - `MqttChannel` for the local broker and for AWS IoT Core (mTLS)
//! - `MockChannel` for testing without a broker

pub mod channel;
pub mod config;
pub mod error;
pub mod mock;
pub mod tls;

pub use channel::{Channel, MqttChannel};
pub use config::ConnectionConfig;
pub use error::{MqttError, MqttResult};
pub use mock::{MockChannel, PublishedMessage};
