//! MQTT event loop drivers.
//!
//! Each bus direction runs one loop: poll the subscriber connection,
//! subscribe the registered patterns on every (re)connect, hand each
//! publish to the handler registry, and publish the resulting messages
//! on the opposite connection. The subscribe and route steps work on
//! any `Channel`, so they are exercised in tests against the mock.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{Event, EventLoop, Packet, QoS};

use sb_mqtt_channel::Channel;

use crate::bus::HandlerRegistry;
use crate::handlers::InboundMessage;

/// Match an MQTT topic against a subscription filter with `+` and `#`
/// wildcards.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_parts = filter.split('/');
    let mut topic_parts = topic.split('/');
    loop {
        match (filter_parts.next(), topic_parts.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Issue every subscription of the registry on the subscriber
/// connection.
pub async fn subscribe_all<C: Channel>(name: &str, subscriber: &C, registry: &HandlerRegistry) {
    for topic in registry.subscription_topics() {
        if let Err(e) = subscriber.subscribe(&topic, QoS::AtLeastOnce).await {
            tracing::error!(bus = name, topic = %topic, error = %e, "subscribe failed");
        }
    }
}

/// Dispatch one inbound message and publish the handlers' outputs in
/// order on the opposite connection.
pub async fn route_message<C: Channel>(
    name: &str,
    registry: &HandlerRegistry,
    msg: &InboundMessage,
    publisher: &C,
) {
    for out in registry.dispatch(msg) {
        if let Err(e) = publisher
            .publish(&out.topic, &out.payload, QoS::AtLeastOnce)
            .await
        {
            tracing::error!(bus = name, topic = %out.topic, error = %e, "publish failed");
        }
    }
}

/// Drive one bus direction until the task is cancelled.
///
/// Reconnection is rumqttc's job; this loop re-issues the subscriptions
/// whenever the broker acknowledges a connection and backs off briefly
/// on event loop errors.
pub async fn run_bus<S: Channel, P: Channel>(
    name: &'static str,
    subscriber: Arc<S>,
    mut eventloop: EventLoop,
    registry: HandlerRegistry,
    publisher: Arc<P>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!(bus = name, "connected");
                subscribe_all(name, subscriber.as_ref(), &registry).await;
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let msg = InboundMessage {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                };
                route_message(name, &registry, &msg, publisher.as_ref()).await;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(bus = name, error = %e, "event loop error, reconnecting in 5s");
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}
