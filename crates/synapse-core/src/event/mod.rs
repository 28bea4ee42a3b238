//! Delivery event stream.
//!
//! Provides an `EventBus` that fans `BusEvent` values out to every subscriber
//! via a `tokio::sync::broadcast` channel.

pub mod bus;

pub use bus::EventBus;
