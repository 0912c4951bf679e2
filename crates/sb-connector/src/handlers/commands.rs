//! Cloud-to-device command request filter.
//!
//! Command requests arrive from the cloud on the Ditto command topics.
//! This handler guards an inner forwarder: only envelopes addressed to
//! the configured device or one of its children get through; everything
//! else, including unparseable payloads, is dropped without error.

use sb_protocol::ditto::Envelope;
use sb_protocol::topics;

use super::{HandlerError, InboundMessage, MessageHandler, OutboundMessage};
use crate::settings::BridgeSettings;

/// The guarded inner command handler.
pub type InnerHandler =
    Box<dyn Fn(&InboundMessage) -> Result<Vec<OutboundMessage>, HandlerError> + Send + Sync>;

/// Handler forwarding command requests toward the local broker.
pub struct CommandRequestHandler {
    device_id: String,
    inner: InnerHandler,
}

impl CommandRequestHandler {
    /// The default inner handler republishes the request unchanged on
    /// its own topic; response correlation is the local command stack's
    /// concern.
    pub fn new() -> Self {
        Self::with_inner(Box::new(forward_unchanged))
    }

    pub fn with_inner(inner: InnerHandler) -> Self {
        Self {
            device_id: String::new(),
            inner,
        }
    }
}

impl Default for CommandRequestHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn forward_unchanged(msg: &InboundMessage) -> Result<Vec<OutboundMessage>, HandlerError> {
    Ok(vec![OutboundMessage {
        topic: msg.topic.clone(),
        payload: msg.payload.clone(),
    }])
}

impl MessageHandler for CommandRequestHandler {
    fn init(&mut self, settings: &BridgeSettings) -> Result<(), HandlerError> {
        self.device_id = settings.device_id.clone();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "command_request_handler"
    }

    fn topics(&self) -> String {
        topics::COMMAND_REQUEST_TOPICS.to_string()
    }

    fn handle(&self, msg: &InboundMessage) -> Result<Vec<OutboundMessage>, HandlerError> {
        let Ok(env) = serde_json::from_slice::<Envelope>(&msg.payload) else {
            return Ok(Vec::new());
        };
        let id = env.thing_id();
        if id == self.device_id || id.starts_with(&format!("{}:", self.device_id)) {
            return (self.inner)(msg);
        }
        Ok(Vec::new())
    }
}
