//! Protocol types for the ShadowBridge connector.
//!
//! Covers both sides of the bridge:
//! - `ditto` — Ditto twin protocol envelopes and topics (local broker side)
//! - `topics` — AWS Device Shadow topic grammar (cloud side)
//! - `json` — structural walkers over dynamic JSON payloads

pub mod ditto;
pub mod json;
pub mod topics;

pub use ditto::{Envelope, Topic, TopicParseError};
pub use topics::ShadowOp;
