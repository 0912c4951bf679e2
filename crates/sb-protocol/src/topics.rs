//! Topic builders and parsers for both sides of the bridge.
//!
//! AWS Device Shadow topic structure:
//! ```text
//! $aws/things/{thing}/shadow/{op}                      root shadow
//! $aws/things/{thing}/shadow/name/{shadow}/{op}        named shadow
//! $aws/things/{thing}/shadow/update/accepted           root notifications
//! $aws/things/{thing}/shadow/name/+/update/accepted    named notifications
//! ```
//!
//! The named-shadow slot carries either a feature name (root thing), a
//! child thing suffix (child attributes), or `{child}:{feature}`.

/// Local broker topics carrying device-to-cloud traffic.
pub const LOCAL_EVENT_TOPICS: &str = "event/#,e/#,telemetry/#,t/#";

/// Cloud topics carrying command requests toward the device.
pub const COMMAND_REQUEST_TOPICS: &str = "command//+/req/#,cmd//+/q/#";

const SHADOW_PREFIX: &str = "$aws/things";
const DELETE_ACCEPTED_SUFFIX: &str = "/delete/accepted";

// Index of the shadow name in a slash-split named-shadow topic:
// $aws / things / {thing} / shadow / name / {shadow} / ...
const NAMED_SHADOW_INDEX: usize = 5;

/// Shadow operation selected per outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowOp {
    Update,
    Delete,
}

impl ShadowOp {
    pub fn as_str(self) -> &'static str {
        match self {
            ShadowOp::Update => "update",
            ShadowOp::Delete => "delete",
        }
    }
}

// ─── Outbound shadow topics ───

/// Topic addressing the root thing's unnamed shadow.
pub fn root_shadow(device_id: &str, op: ShadowOp) -> String {
    format!("{SHADOW_PREFIX}/{device_id}/shadow/{}", op.as_str())
}

/// Topic addressing a named shadow of the root thing (a root feature
/// or a child thing's attributes).
pub fn named_shadow(device_id: &str, shadow_name: &str, op: ShadowOp) -> String {
    format!(
        "{SHADOW_PREFIX}/{device_id}/shadow/name/{shadow_name}/{}",
        op.as_str()
    )
}

/// Topic addressing a feature of a child thing.
pub fn child_feature_shadow(device_id: &str, child: &str, feature: &str, op: ShadowOp) -> String {
    named_shadow(device_id, &format!("{child}:{feature}"), op)
}

// ─── Accepted-notification subscriptions ───

/// The four `/accepted` subscription patterns for one root device,
/// comma-separated in subscription-list form.
pub fn accepted_subscriptions(device_id: &str) -> String {
    let base = format!("{SHADOW_PREFIX}/{device_id}/shadow");
    [
        format!("{base}/update/accepted"),
        format!("{base}/delete/accepted"),
        format!("{base}/name/+/update/accepted"),
        format!("{base}/name/+/delete/accepted"),
    ]
    .join(",")
}

/// Derive the shadow identifier from an accepted-notification topic.
///
/// Root topics (no `/name/` segment) map to the device identity; named
/// topics map to the shadow name segment.
pub fn shadow_id_from_accepted(topic: &str, device_id: &str) -> String {
    if !topic.contains("/name/") {
        return device_id.to_string();
    }
    topic
        .split('/')
        .nth(NAMED_SHADOW_INDEX)
        .unwrap_or(device_id)
        .to_string()
}

pub fn is_delete_accepted(topic: &str) -> bool {
    topic.ends_with(DELETE_ACCEPTED_SUFFIX)
}

// ─── Local pass-through topics ───

/// Topic for forwarded non-twin event messages.
pub fn event_passthrough(tenant_id: &str, device_id: &str) -> String {
    format!("event/{tenant_id}/{device_id}")
}

/// Topic for forwarded non-twin telemetry messages.
pub fn telemetry_passthrough(tenant_id: &str, device_id: &str) -> String {
    format!("telemetry/{tenant_id}/{device_id}")
}
