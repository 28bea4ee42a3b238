//! Shared domain types for the Synapse message bus.
//!
//! Messages, subscriptions, delivery events, statistics, configuration and
//! their error types. No runtime dependencies -- only serde, chrono, uuid,
//! thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod stats;
