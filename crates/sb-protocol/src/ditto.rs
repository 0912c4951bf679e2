//! Ditto twin protocol envelope and topic types.
//!
//! An envelope is the JSON message exchanged with the local broker:
//! a slash-delimited `topic`, a JSON-pointer `path`, an arbitrary
//! `value`, optional `headers`, and an optional `status` (zero or
//! absent for requests).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const GROUP_THINGS: &str = "things";
pub const CHANNEL_TWIN: &str = "twin";
pub const CRITERION_COMMANDS: &str = "commands";

pub const ACTION_CREATE: &str = "create";
pub const ACTION_MODIFY: &str = "modify";
pub const ACTION_MERGE: &str = "merge";
pub const ACTION_DELETE: &str = "delete";

/// Error parsing a slash-delimited Ditto topic string.
#[derive(Debug, Error)]
#[error("invalid Ditto topic '{0}'")]
pub struct TopicParseError(pub String);

/// A parsed Ditto topic, e.g. `test/device/things/twin/commands/modify`.
///
/// Serializes to and from its slash-delimited string form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic {
    pub namespace: String,
    pub entity_name: String,
    pub group: String,
    pub channel: String,
    pub criterion: String,
    pub action: String,
}

impl Topic {
    /// The thing identity addressed by this topic, `<namespace>:<entity-name>`.
    pub fn thing_id(&self) -> String {
        format!("{}:{}", self.namespace, self.entity_name)
    }

    /// Whether this topic is a twin command with one of the four
    /// shadow-relevant actions.
    pub fn is_twin_command(&self) -> bool {
        self.group == GROUP_THINGS
            && self.channel == CHANNEL_TWIN
            && self.criterion == CRITERION_COMMANDS
            && matches!(
                self.action.as_str(),
                ACTION_CREATE | ACTION_MODIFY | ACTION_MERGE | ACTION_DELETE
            )
    }

    pub fn is_delete(&self) -> bool {
        self.action == ACTION_DELETE
    }

    pub fn is_merge(&self) -> bool {
        self.action == ACTION_MERGE
    }
}

impl std::str::FromStr for Topic {
    type Err = TopicParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() < 6 || parts.iter().take(6).any(|p| p.is_empty()) {
            return Err(TopicParseError(s.to_string()));
        }
        Ok(Topic {
            namespace: parts[0].to_string(),
            entity_name: parts[1].to_string(),
            group: parts[2].to_string(),
            channel: parts[3].to_string(),
            criterion: parts[4].to_string(),
            // Live message subjects may contain further slashes.
            action: parts[5..].join("/"),
        })
    }
}

impl TryFrom<String> for Topic {
    type Error = TopicParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Topic> for String {
    fn from(t: Topic) -> String {
        t.to_string()
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}/{}",
            self.namespace, self.entity_name, self.group, self.channel, self.criterion, self.action
        )
    }
}

/// A Ditto protocol envelope.
///
/// Unknown fields are tolerated; only the fields the bridge routes on
/// are modeled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: Topic,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Value>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub status: i64,
}

fn is_zero(status: &i64) -> bool {
    *status == 0
}

impl Envelope {
    /// Whether this envelope is a request (no response status set).
    pub fn is_request(&self) -> bool {
        self.status == 0
    }

    /// The thing identity of the envelope's topic.
    pub fn thing_id(&self) -> String {
        self.topic.thing_id()
    }
}
