//! Device-to-cloud transformer.
//!
//! Converts Ditto twin command envelopes arriving on the local event
//! and telemetry topics into AWS Device Shadow publications. A single
//! envelope can fan out into several shadow messages: one for the
//! attributes scope and one per feature, each addressed by thing and
//! feature identity. Anything that is not a twin command is forwarded
//! unchanged as a timestamped event.

use std::sync::Arc;

use serde_json::{Map, Value};

use sb_protocol::ditto::Envelope;
use sb_protocol::topics::{self, ShadowOp};
use sb_protocol::{json, Topic};

use super::{HandlerError, InboundMessage, MessageHandler, OutboundMessage, ShadowStateReader};
use crate::settings::{BridgeSettings, MessageFilters};

const ATTRIBUTES_TAG: &str = "attributes";
const FEATURES_TAG: &str = "features";
const PROPERTIES_TAG: &str = "properties";
const DEFINITION_TAG: &str = "definition";

const STATE_TAG: &str = "state";
const REPORTED_TAG: &str = "reported";

/// Handler for local device-to-cloud traffic.
pub struct DeviceHandler {
    tenant_id: String,
    device_id: String,
    filters: MessageFilters,
    states: Arc<dyn ShadowStateReader>,
}

impl DeviceHandler {
    pub fn new(states: Arc<dyn ShadowStateReader>) -> Self {
        Self {
            tenant_id: String::new(),
            device_id: String::new(),
            filters: MessageFilters::default(),
            states,
        }
    }

    /// Whether the envelope is a twin command addressed to the
    /// configured device or one of its children.
    fn is_shadow_message(&self, env: &Envelope) -> bool {
        if !env.is_request() || !env.topic.is_twin_command() {
            return false;
        }
        let id = env.thing_id();
        id == self.device_id || id.starts_with(&format!("{}:", self.device_id))
    }

    /// The child suffix of a thing ID under the configured device, or
    /// `None` for the root thing itself.
    fn child_suffix<'a>(&self, thing_id: &'a str) -> Option<&'a str> {
        if thing_id.len() == self.device_id.len() {
            None
        } else {
            Some(&thing_id[self.device_id.len() + 1..])
        }
    }

    /// Convert a twin command envelope into its shadow messages.
    ///
    /// Returns `None` when the envelope is not a shadow message at all
    /// (pass-through applies), and `Some(vec![])` when it is one but is
    /// filtered out or carries nothing to publish.
    fn to_shadow_messages(
        &self,
        env: &Envelope,
    ) -> Result<Option<Vec<OutboundMessage>>, HandlerError> {
        if !self.is_shadow_message(env) {
            return Ok(None);
        }

        if let Some(filter) = &self.filters.topic_filter {
            let topic = env.topic.to_string();
            if filter.is_match(&topic) {
                tracing::debug!(topic = %topic, "excluded message by topic filter");
                return Ok(Some(Vec::new()));
            }
        }

        let value = json::integrate(&env.path, env.value.clone().unwrap_or(Value::Null));
        let Some(value) = self.filter_payload(value) else {
            return Ok(Some(Vec::new()));
        };

        let mut messages = Vec::new();
        if let Value::Object(root) = &value {
            if let Some(attributes) = root.get(ATTRIBUTES_TAG) {
                let scope = match attributes {
                    Value::Object(_) => attributes.clone(),
                    _ => Value::Null,
                };
                messages.push(self.shadow_message(env, None, scope)?);
            }
            if let Some(Value::Object(features)) = root.get(FEATURES_TAG) {
                for (feature_name, feature) in features {
                    let feature_name = Some(feature_name.as_str());
                    if feature.is_null() {
                        messages.push(self.shadow_message(env, feature_name, Value::Null)?);
                    } else if let Some(properties) = feature_properties(feature) {
                        messages.push(self.shadow_message(env, feature_name, properties)?);
                    }
                }
            }
        }
        Ok(Some(messages))
    }

    /// Build one outbound shadow message for an attributes or feature
    /// scope.
    fn shadow_message(
        &self,
        env: &Envelope,
        feature_name: Option<&str>,
        value: Value,
    ) -> Result<OutboundMessage, HandlerError> {
        let (topic, op) = self.shadow_topic(&env.topic, feature_name, &value);

        let payload = match op {
            ShadowOp::Delete => Vec::new(),
            ShadowOp::Update => {
                let value = self.merge_with_reported(env, feature_name, value);
                let document = json::wrap(&[STATE_TAG, REPORTED_TAG], value);
                serde_json::to_vec(&document)?
            }
        };

        tracing::debug!(topic = %topic, "sending shadow message");
        Ok(OutboundMessage { topic, payload })
    }

    /// Select the destination shadow topic and operation for one scope.
    fn shadow_topic(
        &self,
        topic: &Topic,
        feature_name: Option<&str>,
        value: &Value,
    ) -> (String, ShadowOp) {
        let op = if topic.is_delete() && is_entire_shadow(value) {
            ShadowOp::Delete
        } else {
            ShadowOp::Update
        };

        let thing_id = topic.thing_id();
        let topic = match (self.child_suffix(&thing_id), feature_name) {
            (None, None) => topics::root_shadow(&self.device_id, op),
            (None, Some(feature)) => topics::named_shadow(&self.device_id, feature, op),
            (Some(child), None) => topics::named_shadow(&self.device_id, child, op),
            (Some(child), Some(feature)) => {
                topics::child_feature_shadow(&self.device_id, child, feature, op)
            }
        };
        (topic, op)
    }

    /// The mirror key for one scope: device ID for root attributes,
    /// child suffix for child attributes, feature name for root
    /// features, `child:feature` for child features.
    fn shadow_id(&self, thing_id: &str, feature_name: Option<&str>) -> String {
        match (self.child_suffix(thing_id), feature_name) {
            (None, None) => self.device_id.clone(),
            (None, Some(feature)) => feature.to_string(),
            (Some(child), None) => child.to_string(),
            (Some(child), Some(feature)) => format!("{child}:{feature}"),
        }
    }

    /// Merge an update against the last accepted shadow state so that
    /// properties absent from the replacement become `null` tombstones.
    ///
    /// Only `create` and `modify` replace state; a Ditto `merge` is a
    /// partial patch and a `delete` already carries its own nulls, so
    /// both are emitted verbatim. Tombstones are confined to the subtree
    /// the envelope path addresses: everything above it is a partial
    /// document AWS merges by itself.
    fn merge_with_reported(
        &self,
        env: &Envelope,
        feature_name: Option<&str>,
        value: Value,
    ) -> Value {
        if env.topic.is_merge() || env.topic.is_delete() {
            return value;
        }
        let shadow_id = self.shadow_id(&env.thing_id(), feature_name);
        let Some(prev) = self.states.current_state(&shadow_id) else {
            return value;
        };

        let rel = scope_relative_path(&env.path, feature_name);
        if rel.is_empty() {
            return json::merge_with_tombstones(&prev, &value);
        }
        if let (Some(prev_sub), Some(next_sub)) =
            (json::descend(&prev, &rel), json::descend(&value, &rel))
        {
            let merged = json::merge_with_tombstones(prev_sub, next_sub);
            return json::wrap(&rel, merged);
        }
        value
    }

    /// Remove every leaf whose synthesized JSON path matches one of the
    /// payload filters, dropping containers that become empty. `None`
    /// means the whole value was removed.
    fn filter_payload(&self, value: Value) -> Option<Value> {
        if self.filters.payload_filters.is_empty() {
            return Some(value);
        }
        self.prune("", value)
    }

    fn prune(&self, path: &str, value: Value) -> Option<Value> {
        match value {
            Value::Object(map) => {
                let mut kept = Map::new();
                for (key, child) in map {
                    let child_path = format!("{path}/{key}");
                    if let Some(child) = self.prune(&child_path, child) {
                        kept.insert(key, child);
                    }
                }
                if kept.is_empty() {
                    None
                } else {
                    Some(Value::Object(kept))
                }
            }
            Value::Array(items) => {
                let mut kept = Vec::new();
                for (index, item) in items.into_iter().enumerate() {
                    let child_path = format!("{path}/{index}");
                    if let Some(item) = self.prune(&child_path, item) {
                        kept.push(item);
                    }
                }
                if kept.is_empty() {
                    None
                } else {
                    Some(Value::Array(kept))
                }
            }
            leaf => {
                if self
                    .filters
                    .payload_filters
                    .iter()
                    .any(|filter| filter.is_match(path))
                {
                    tracing::debug!(path = %path, "excluded JSON path");
                    None
                } else {
                    Some(leaf)
                }
            }
        }
    }

    /// Forward a non-twin message as a timestamped event toward the
    /// cloud event or telemetry topic.
    fn forward_event(&self, msg: &InboundMessage) -> Vec<OutboundMessage> {
        let topic = if msg.topic.starts_with('t') {
            topics::telemetry_passthrough(&self.tenant_id, &self.device_id)
        } else {
            topics::event_passthrough(&self.tenant_id, &self.device_id)
        };
        vec![OutboundMessage {
            topic,
            payload: stamp_timestamp(&msg.payload),
        }]
    }
}

impl MessageHandler for DeviceHandler {
    fn init(&mut self, settings: &BridgeSettings) -> Result<(), HandlerError> {
        self.tenant_id = settings.tenant_id.clone();
        self.device_id = settings.device_id.clone();
        self.filters = settings.filters.clone();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "device_to_cloud_handler"
    }

    fn topics(&self) -> String {
        topics::LOCAL_EVENT_TOPICS.to_string()
    }

    fn handle(&self, msg: &InboundMessage) -> Result<Vec<OutboundMessage>, HandlerError> {
        if let Ok(env) = serde_json::from_slice::<Envelope>(&msg.payload) {
            if let Some(messages) = self.to_shadow_messages(&env)? {
                return Ok(messages);
            }
        }
        Ok(self.forward_event(msg))
    }
}

/// Whether a scope value addresses the entire shadow rather than
/// individual properties.
fn is_entire_shadow(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        _ => true,
    }
}

/// All feature properties, including the definition when present.
fn feature_properties(feature: &Value) -> Option<Value> {
    let feature = feature.as_object()?;
    let mut result = match feature.get(PROPERTIES_TAG) {
        Some(Value::Object(properties)) => properties.clone(),
        _ => Map::new(),
    };
    if let Some(definition) = feature.get(DEFINITION_TAG) {
        result.insert(DEFINITION_TAG.to_string(), definition.clone());
    }
    if result.is_empty() {
        None
    } else {
        Some(Value::Object(result))
    }
}

/// The envelope path relative to a shadow scope: segments below
/// `/attributes`, or below `/features/{name}` with a leading
/// `properties` segment dropped. Paths at or above the scope root have
/// an empty relative path.
fn scope_relative_path<'a>(path: &'a str, feature_name: Option<&str>) -> Vec<&'a str> {
    let segments = json::path_segments(path);
    match feature_name {
        None => {
            if segments.first() == Some(&ATTRIBUTES_TAG) {
                segments[1..].to_vec()
            } else {
                Vec::new()
            }
        }
        Some(feature) => {
            if segments.len() >= 2 && segments[0] == FEATURES_TAG && segments[1] == feature {
                let below_feature = &segments[2..];
                if below_feature.first() == Some(&PROPERTIES_TAG) {
                    below_feature[1..].to_vec()
                } else {
                    below_feature.to_vec()
                }
            } else {
                Vec::new()
            }
        }
    }
}

/// Stamp an `x-timestamp` header (epoch milliseconds) into a JSON
/// envelope payload; non-object payloads pass through unchanged.
fn stamp_timestamp(payload: &[u8]) -> Vec<u8> {
    let Ok(Value::Object(mut envelope)) = serde_json::from_slice::<Value>(payload) else {
        return payload.to_vec();
    };
    let headers = envelope
        .entry("headers".to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(headers) = headers {
        headers.insert(
            "x-timestamp".to_string(),
            Value::String(chrono::Utc::now().timestamp_millis().to_string()),
        );
    }
    serde_json::to_vec(&Value::Object(envelope)).unwrap_or_else(|_| payload.to_vec())
}
