//! Integration tests for the ShadowBridge connector live in `tests/`.
