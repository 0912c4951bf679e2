//! Message handlers wired onto the bridge's two buses.
//!
//! A handler consumes inbound messages from its subscription topics and
//! produces zero or more outbound messages, each addressed to its own
//! destination topic. Routing between brokers is the bus's concern.

pub mod commands;
pub mod passthrough;
pub mod state;

use thiserror::Error;

use crate::settings::BridgeSettings;

pub use commands::CommandRequestHandler;
pub use passthrough::DeviceHandler;
pub use state::{ShadowStateHandler, ShadowStateReader, ShadowStore};

/// A message received from one of the brokers.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// A message to be published by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Handler-level errors. The bus logs these; they never tear down a
/// subscription.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("initialization error: {0}")]
    Init(String),
}

/// A message handler registered with the bus.
///
/// `init` runs once at startup with the validated settings; handlers
/// failing to initialize are skipped. `topics` returns the handler's
/// comma-separated subscription patterns. `handle` must be safe to call
/// concurrently across subscriptions.
pub trait MessageHandler: Send + Sync {
    fn init(&mut self, settings: &BridgeSettings) -> Result<(), HandlerError>;

    fn name(&self) -> &'static str;

    fn topics(&self) -> String;

    fn handle(&self, msg: &InboundMessage) -> Result<Vec<OutboundMessage>, HandlerError>;
}
