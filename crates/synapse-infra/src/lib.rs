//! Infrastructure layer for Synapse.
//!
//! Resolves the data directory and loads or writes the bus configuration
//! stored there. Nothing in here is needed to run a bus in-process; the CLI
//! uses it to build a `BusConfig` from disk.

pub mod config;
pub mod paths;
