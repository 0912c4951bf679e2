//! Handler registration and dispatch.
//!
//! A bus owns a set of initialized handlers. Handlers that fail to
//! initialize or declare no subscription topics are skipped with a
//! warning; the bridge keeps running with the rest.

use crate::handlers::{InboundMessage, MessageHandler, OutboundMessage};
use crate::router::topic_matches;
use crate::settings::BridgeSettings;

struct Registered {
    handler: Box<dyn MessageHandler>,
    topics: Vec<String>,
}

/// An initialized set of handlers with their subscription patterns.
pub struct HandlerRegistry {
    entries: Vec<Registered>,
}

/// Initialize handlers against the settings and collect the survivors.
pub fn register_handlers(
    settings: &BridgeSettings,
    handlers: Vec<Box<dyn MessageHandler>>,
) -> HandlerRegistry {
    let mut entries = Vec::new();
    for mut handler in handlers {
        if let Err(e) = handler.init(settings) {
            tracing::warn!(
                handler_name = handler.name(),
                error = %e,
                "skipping handler that cannot be initialized"
            );
            continue;
        }
        let topics: Vec<String> = handler
            .topics()
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if topics.is_empty() {
            tracing::warn!(
                handler_name = handler.name(),
                "skipping handler without any topics"
            );
            continue;
        }
        entries.push(Registered { handler, topics });
    }
    HandlerRegistry { entries }
}

impl HandlerRegistry {
    /// All subscription patterns of the registered handlers.
    pub fn subscription_topics(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(|entry| entry.topics.iter().cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hand an inbound message to every handler whose subscription
    /// matches its topic and collect the outbound messages in order.
    ///
    /// Handler errors are logged and do not affect other handlers.
    pub fn dispatch(&self, msg: &InboundMessage) -> Vec<OutboundMessage> {
        let mut out = Vec::new();
        for entry in &self.entries {
            if !entry
                .topics
                .iter()
                .any(|pattern| topic_matches(pattern, &msg.topic))
            {
                continue;
            }
            match entry.handler.handle(msg) {
                Ok(messages) => out.extend(messages),
                Err(e) => tracing::debug!(
                    handler_name = entry.handler.name(),
                    topic = %msg.topic,
                    error = %e,
                    "handler rejected message"
                ),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::HandlerError;

    struct FakeHandler {
        name: &'static str,
        topics: &'static str,
        fail_init: bool,
    }

    impl MessageHandler for FakeHandler {
        fn init(&mut self, _settings: &BridgeSettings) -> Result<(), HandlerError> {
            if self.fail_init {
                return Err(HandlerError::Init("boom".to_string()));
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            self.name
        }

        fn topics(&self) -> String {
            self.topics.to_string()
        }

        fn handle(&self, msg: &InboundMessage) -> Result<Vec<OutboundMessage>, HandlerError> {
            Ok(vec![OutboundMessage {
                topic: format!("out/{}", self.name),
                payload: msg.payload.clone(),
            }])
        }
    }

    fn registry(handlers: Vec<Box<dyn MessageHandler>>) -> HandlerRegistry {
        register_handlers(&BridgeSettings::default(), handlers)
    }

    #[test]
    fn failing_init_skips_the_handler() {
        let registry = registry(vec![
            Box::new(FakeHandler {
                name: "good",
                topics: "event/#",
                fail_init: false,
            }),
            Box::new(FakeHandler {
                name: "bad",
                topics: "event/#",
                fail_init: true,
            }),
        ]);
        assert_eq!(registry.subscription_topics(), vec!["event/#"]);
    }

    #[test]
    fn empty_topics_skip_the_handler() {
        let registry = registry(vec![Box::new(FakeHandler {
            name: "topicless",
            topics: "",
            fail_init: false,
        })]);
        assert!(registry.is_empty());
    }

    #[test]
    fn dispatch_routes_by_topic_match() {
        let registry = registry(vec![
            Box::new(FakeHandler {
                name: "events",
                topics: "event/#,e/#",
                fail_init: false,
            }),
            Box::new(FakeHandler {
                name: "telemetry",
                topics: "telemetry/#,t/#",
                fail_init: false,
            }),
        ]);

        let msg = InboundMessage {
            topic: "event/tenant/device".to_string(),
            payload: b"x".to_vec(),
        };
        let out = registry.dispatch(&msg);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].topic, "out/events");

        let msg = InboundMessage {
            topic: "t".to_string(),
            payload: b"x".to_vec(),
        };
        let out = registry.dispatch(&msg);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].topic, "out/telemetry");
    }

    #[test]
    fn comma_separated_topics_are_split() {
        let registry = registry(vec![Box::new(FakeHandler {
            name: "events",
            topics: "event/#, e/#",
            fail_init: false,
        })]);
        assert_eq!(registry.subscription_topics(), vec!["event/#", "e/#"]);
    }
}
