//! In-process message bus for Synapse agents.
//!
//! Agents register an async handler and exchange typed messages through a
//! bounded priority queue drained by a pool of delivery workers. Failed
//! deliveries are retried with exponential backoff until they succeed, expire
//! or run out of attempts. This crate depends only on `synapse-types`, never
//! on `synapse-infra` or any IO crate.

pub mod event;
pub mod message;

pub use message::{MessageBus, MessageHandler, handler_fn};
