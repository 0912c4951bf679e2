//! Shadow state mirror.
//!
//! AWS confirms every shadow update and delete on the `/accepted`
//! topics. This handler tracks the last accepted `state.reported`
//! document per shadow so the device-to-cloud transformer can compute
//! which properties disappeared and must be nulled out.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;

use sb_protocol::topics;

use super::{HandlerError, InboundMessage, MessageHandler, OutboundMessage};
use crate::settings::BridgeSettings;

/// Read access to the last accepted shadow state.
///
/// The transformer depends on this capability rather than on the store
/// itself, so tests can substitute a canned implementation.
pub trait ShadowStateReader: Send + Sync {
    /// The last reported state AWS accepted for the shadow, if any.
    fn current_state(&self, shadow_id: &str) -> Option<Value>;
}

/// Process-wide map from shadow ID to the last accepted reported state.
///
/// Many readers, one writer per shadow; a read-write lock suffices.
#[derive(Debug, Default)]
pub struct ShadowStore {
    shadows: RwLock<HashMap<String, Value>>,
}

impl ShadowStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, shadow_id: String, reported: Value) {
        self.shadows.write().unwrap().insert(shadow_id, reported);
    }

    fn remove(&self, shadow_id: &str) {
        self.shadows.write().unwrap().remove(shadow_id);
    }
}

impl ShadowStateReader for ShadowStore {
    fn current_state(&self, shadow_id: &str) -> Option<Value> {
        self.shadows.read().unwrap().get(shadow_id).cloned()
    }
}

/// Handler feeding the `ShadowStore` from the four `/accepted`
/// subscriptions of the configured device.
pub struct ShadowStateHandler {
    device_id: String,
    topics: String,
    store: std::sync::Arc<ShadowStore>,
}

impl ShadowStateHandler {
    pub fn new(store: std::sync::Arc<ShadowStore>) -> Self {
        Self {
            device_id: String::new(),
            topics: String::new(),
            store,
        }
    }
}

impl MessageHandler for ShadowStateHandler {
    fn init(&mut self, settings: &BridgeSettings) -> Result<(), HandlerError> {
        self.device_id = settings.device_id.clone();
        self.topics = topics::accepted_subscriptions(&self.device_id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "shadow_state_handler"
    }

    fn topics(&self) -> String {
        self.topics.clone()
    }

    /// Replace the tracked state on `update/accepted`; drop it on
    /// `delete/accepted`. Never produces outbound messages.
    fn handle(&self, msg: &InboundMessage) -> Result<Vec<OutboundMessage>, HandlerError> {
        let shadow_id = topics::shadow_id_from_accepted(&msg.topic, &self.device_id);

        if topics::is_delete_accepted(&msg.topic) {
            self.store.remove(&shadow_id);
            return Ok(Vec::new());
        }

        let payload: Value = serde_json::from_slice(&msg.payload)
            .map_err(|_| HandlerError::InvalidPayload("not valid JSON".to_string()))?;
        let reported = reported_state(&payload).ok_or_else(|| {
            HandlerError::InvalidPayload("no reported state in accepted update".to_string())
        })?;

        self.store.insert(shadow_id, reported.clone());
        Ok(Vec::new())
    }
}

/// Locate `state.reported` in an accepted-update payload.
fn reported_state(payload: &Value) -> Option<&Value> {
    let reported = payload.get("state")?.get("reported")?;
    if reported.is_null() {
        None
    } else {
        Some(reported)
    }
}
